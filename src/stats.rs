//! Corpus statistics overview.
//!
//! Prints document counts by lifecycle status and by category. Used by
//! `legally stats` to check that submissions are being processed.

use anyhow::Result;

use crate::config::Config;
use crate::service::Service;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, service: &Service) -> Result<()> {
    let stats = service.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Legally Corpus Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.total);

    if !stats.by_status.is_empty() {
        println!();
        println!("  By status:");
        for (status, count) in &stats.by_status {
            println!("    {:<14} {:>6}", status, count);
        }
    }

    if !stats.by_category.is_empty() {
        println!();
        println!("  By category:");
        println!("    {:<24} {:>6}", "CATEGORY", "DOCS");
        println!("    {}", "-".repeat(31));
        for (category, count) in &stats.by_category {
            println!("    {:<24} {:>6}", category, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
