//! Read-only queue overview.

use anyhow::Result;
use comfy_table::Table;
use vidslim_db::{ensure_schema, open_pool, JobRepo, VideoStatus};
use vidslim_workers::Config;

pub async fn print(config: &Config) -> Result<()> {
    let settings = config.db_settings();
    let pool = open_pool(&settings).await?;
    ensure_schema(&pool).await?;
    let repo = JobRepo::new(pool, &settings);

    let stats = repo.stats().await?;
    let count_for = |status: VideoStatus| {
        stats
            .counts
            .iter()
            .find(|entry| entry.status == status)
            .map(|entry| entry.count)
            .unwrap_or(0)
    };

    let mut table = Table::new();
    table.set_header(vec!["status", "jobs"]);
    for status in VideoStatus::ALL {
        table.add_row(vec![status.to_string(), count_for(status).to_string()]);
    }
    println!("{table}");
    println!(
        "reclaimed: {:.1} MB ({} bytes)",
        stats.reclaimed_bytes as f64 / (1024.0 * 1024.0),
        stats.reclaimed_bytes
    );
    Ok(())
}
