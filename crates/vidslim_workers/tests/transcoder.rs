//! Transcoder supervision against a scripted stand-in encoder.

#![cfg(unix)]

mod common;

use common::{test_repo, write_script, MockProbe};
use vidslim_db::{JobRepo, VideoStatus};
use vidslim_workers::tick::{Tick, WorkerLoop};
use vidslim_workers::transcoder::Transcoder;

/// Insert a job and park it `ready` with the given command.
async fn ready_job(repo: &JobRepo, filepath: &str, size: i64, command: &str) -> i64 {
    let name = filepath.rsplit('/').next().unwrap();
    let id = repo
        .insert(filepath, name, Some(r#"{"duration":"100"}"#), "h264", size)
        .await
        .unwrap();
    repo.update_status(id, VideoStatus::Confirmed).await.unwrap();
    repo.set_command_ready(id, VideoStatus::Confirmed, command, "{}")
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn successful_run_records_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.mp4");
    std::fs::write(&input, vec![0u8; 1_000_000]).unwrap();
    let out_dir = dir.path().join("out");

    // Emits one healthy progress line (projection 8.5 kB of a 1 MB
    // original) and copies the input to the output.
    let encoder = write_script(
        dir.path(),
        "encoder.sh",
        "#!/bin/sh\n\
         echo \"frame=  300 fps=25 q=28.0 size=       1kB time=00:00:12.00 bitrate= 102kbits/s\" >&2\n\
         cat \"$2\" > \"$3\"\n",
    );

    let repo = test_repo().await;
    let command = format!("{} -i input.mp4 output.mp4", encoder.display());
    let id = ready_job(&repo, &input.to_string_lossy(), 1_000_000, &command).await;

    let mut transcoder = Transcoder::new(repo.clone(), MockProbe::default(), out_dir.clone(), 0.2);
    let tick = transcoder.tick().await.unwrap();
    assert_eq!(tick, Tick::Worked);

    let job = repo.by_id(id).await.unwrap().unwrap();
    assert_eq!(job.status, VideoStatus::Optimized);
    assert_eq!(job.new_codec.as_deref(), Some("hevc"));
    assert_eq!(job.optimized_size, Some(1_000_000));
    assert_eq!(
        job.optimized_path.as_deref(),
        Some(out_dir.join("a.mp4").to_string_lossy().as_ref())
    );
    assert!(job.progress.unwrap().contains("frame="));
    assert_eq!(job.estimated_size, Some(8533));
}

#[tokio::test]
async fn low_projected_reduction_aborts_into_reconfirmed() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.mp4");
    std::fs::write(&input, vec![0u8; 1_000_000]).unwrap();

    // Projects 12.8 MB from a 1 MB original, then waits for the quit
    // request on stdin.
    let encoder = write_script(
        dir.path(),
        "encoder.sh",
        "#!/bin/sh\n\
         echo \"frame=  300 fps=25 q=28.0 size=    1500kB time=00:00:12.00 bitrate= 102kbits/s\" >&2\n\
         read _quit\n\
         exit 0\n",
    );

    let repo = test_repo().await;
    let command = format!("{} -i input.mp4 output.mp4", encoder.display());
    let id = ready_job(&repo, &input.to_string_lossy(), 1_000_000, &command).await;

    let mut transcoder =
        Transcoder::new(repo.clone(), MockProbe::default(), dir.path().join("out"), 0.2);
    let tick = transcoder.tick().await.unwrap();
    assert_eq!(tick, Tick::Worked);

    let job = repo.by_id(id).await.unwrap().unwrap();
    assert_eq!(job.status, VideoStatus::ReConfirmed);
    assert_eq!(job.estimated_size, Some(12_800_000));
    // No output recorded for an aborted run.
    assert!(job.optimized_path.is_none());
}

#[tokio::test]
async fn command_without_placeholders_fails_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.mp4");
    std::fs::write(&input, vec![0u8; 100]).unwrap();

    let repo = test_repo().await;
    let id = ready_job(
        &repo,
        &input.to_string_lossy(),
        100,
        "ffmpeg -i input.mp4 /tmp/fixed-output.mkv",
    )
    .await;

    let mut transcoder =
        Transcoder::new(repo.clone(), MockProbe::default(), dir.path().join("out"), 0.2);
    assert!(transcoder.tick().await.is_err());

    let job = repo.by_id(id).await.unwrap().unwrap();
    assert_eq!(job.status, VideoStatus::Failed);
}

#[tokio::test]
async fn missing_input_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let repo = test_repo().await;
    let id = ready_job(
        &repo,
        "/nonexistent/gone.mp4",
        100,
        "ffmpeg -i input.mp4 output.mp4",
    )
    .await;

    let mut transcoder =
        Transcoder::new(repo.clone(), MockProbe::default(), dir.path().join("out"), 0.2);
    assert!(transcoder.tick().await.is_err());

    let job = repo.by_id(id).await.unwrap().unwrap();
    assert_eq!(job.status, VideoStatus::Failed);
}

#[tokio::test]
async fn nonzero_exit_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.mp4");
    std::fs::write(&input, vec![0u8; 100]).unwrap();

    let encoder = write_script(
        dir.path(),
        "encoder.sh",
        "#!/bin/sh\n\
         echo \"a.mp4: Invalid data found when processing input\" >&2\n\
         exit 1\n",
    );

    let repo = test_repo().await;
    let command = format!("{} -i input.mp4 output.mp4", encoder.display());
    let id = ready_job(&repo, &input.to_string_lossy(), 100, &command).await;

    let mut transcoder =
        Transcoder::new(repo.clone(), MockProbe::default(), dir.path().join("out"), 0.2);
    assert!(transcoder.tick().await.is_err());

    let job = repo.by_id(id).await.unwrap().unwrap();
    assert_eq!(job.status, VideoStatus::Failed);
}

#[tokio::test]
async fn idle_when_nothing_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let repo = test_repo().await;
    let mut transcoder =
        Transcoder::new(repo, MockProbe::default(), dir.path().join("out"), 0.2);
    assert_eq!(transcoder.tick().await.unwrap(), Tick::Idle);
}
