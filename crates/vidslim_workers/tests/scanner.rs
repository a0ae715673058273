//! Scanner behavior against a real directory tree.

mod common;

use common::{test_repo, MockProbe};
use vidslim_db::VideoStatus;
use vidslim_workers::scanner::Scanner;
use vidslim_workers::tick::WorkerLoop;

#[tokio::test]
async fn discovers_and_inserts_new_videos() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.mp4");
    std::fs::write(&file, vec![0u8; 1000]).unwrap();

    let repo = test_repo().await;
    let probe = MockProbe {
        format_json: r#"{"duration":"60"}"#.to_string(),
        ..MockProbe::default()
    };
    let mut scanner = Scanner::new(repo.clone(), probe, dir.path().to_path_buf());
    scanner.tick().await.unwrap();

    let jobs = repo.by_status(VideoStatus::Pending, None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.filename, "a.mp4");
    assert_eq!(job.filepath, file.to_string_lossy());
    assert_eq!(job.original_size, 1000);
    assert_eq!(job.original_codec.as_deref(), Some("h264"));
    assert_eq!(job.ffprobe_data.as_deref(), Some(r#"{"duration":"60"}"#));
}

#[tokio::test]
async fn rescanning_an_unchanged_tree_inserts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.mp4"), vec![0u8; 100]).unwrap();
    std::fs::write(dir.path().join("b.MKV"), vec![0u8; 200]).unwrap();

    let repo = test_repo().await;
    let mut scanner = Scanner::new(repo.clone(), MockProbe::default(), dir.path().to_path_buf());
    scanner.tick().await.unwrap();
    scanner.tick().await.unwrap();

    let jobs = repo.by_status(VideoStatus::Pending, None).await.unwrap();
    assert_eq!(jobs.len(), 2);
}

#[tokio::test]
async fn walks_subdirectories_and_skips_other_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("season-1");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("episode.mov"), vec![0u8; 100]).unwrap();
    std::fs::write(dir.path().join("cover.jpg"), vec![0u8; 100]).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"nope").unwrap();

    let repo = test_repo().await;
    let mut scanner = Scanner::new(repo.clone(), MockProbe::default(), dir.path().to_path_buf());
    scanner.tick().await.unwrap();

    let jobs = repo.by_status(VideoStatus::Pending, None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].filename, "episode.mov");
}

#[tokio::test]
async fn a_file_that_fails_to_probe_does_not_fail_the_tick() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.mp4");
    std::fs::write(&broken, b"not a video").unwrap();
    std::fs::write(dir.path().join("good.mp4"), vec![0u8; 100]).unwrap();

    let repo = test_repo().await;
    let probe = MockProbe {
        fail_for: vec![broken],
        ..MockProbe::default()
    };
    let mut scanner = Scanner::new(repo.clone(), probe, dir.path().to_path_buf());
    scanner.tick().await.unwrap();

    let jobs = repo.by_status(VideoStatus::Pending, None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].filename, "good.mp4");
}

#[tokio::test]
async fn missing_video_directory_fails_the_tick() {
    let repo = test_repo().await;
    let mut scanner = Scanner::new(
        repo,
        MockProbe::default(),
        std::path::PathBuf::from("/nonexistent/video-input"),
    );
    assert!(scanner.tick().await.is_err());
}
