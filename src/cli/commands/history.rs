//! History listing and cleanup.

use tokio::runtime::Runtime;

use super::open_store;
use crate::config::Config;
use crate::db::{self, HistoryEntry};

/// List, clear, or prune generated clips
pub fn cmd_history(rt: &Runtime, config: &Config, limit: u32, clear: bool, prune: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_store(config).await?;

        if clear {
            let removed = db::clear_history(&pool).await?;
            println!("Cleared {} history entries.", removed);
            return Ok(());
        }

        if prune {
            let removed = db::cleanup_orphaned_history(&pool).await?;
            println!("Removed {} entries whose audio file is gone.", removed);
        }

        let entries = db::history(&pool, limit).await?;
        if entries.is_empty() {
            println!("No history.");
            return Ok(());
        }

        for entry in &entries {
            println!("{}", format_entry(entry));
        }

        let total = db::history_count(&pool).await?;
        let size = db::cache_size(&pool).await?;
        println!();
        println!(
            "Showing {} of {} clips, {} on disk.",
            entries.len(),
            total,
            format_size(size)
        );
        anyhow::Ok(())
    })
}

/// One listing line; clips missing from disk are flagged with `!`.
fn format_entry(entry: &HistoryEntry) -> String {
    let flag = if entry.file_exists() { ' ' } else { '!' };
    format!(
        "{flag}{:>5}  {}  {:<16}  {}",
        entry.id,
        entry.created_at,
        entry.voice_name,
        entry.text_preview.replace('\n', " ")
    )
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KIB * KIB {
        format!("{:.1} MiB", bytes / (KIB * KIB))
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes / KIB)
    } else {
        format!("{} B", bytes)
    }
}
