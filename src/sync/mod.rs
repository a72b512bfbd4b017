//! Verify the local upload history against archive.org.

use anyhow::{Context, Result};
use std::path::Path;

use crate::archive::{ArchiveClient, ItemDetails};
use crate::history::HistoryStore;
use crate::output;

/// Outcome of [`sync_history`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub verified: usize,
    pub total: usize,
}

/// Check every history entry remotely and record the verification fields
pub async fn sync_history(archive: &dyn ArchiveClient, store: &HistoryStore) -> Result<SyncSummary> {
    println!("Syncing upload history with archive.org...");
    println!("{}", output::rule());

    let mut history = store.load()?;
    if history.is_empty() {
        println!("No items in upload history.");
        return Ok(SyncSummary::default());
    }

    let mut summary = SyncSummary {
        verified: 0,
        total: history.len(),
    };

    for (identifier, record) in history.iter_mut() {
        println!("\nChecking: {}", identifier);

        let details = match archive.item_details(identifier).await {
            Ok(details) => details,
            Err(e) => {
                println!("  Error fetching {}: {}", identifier, e);
                tracing::warn!("Could not verify {}: {}", identifier, e);
                None
            }
        };

        match details {
            Some(remote) => {
                println!("  ✓ Exists on archive.org");
                println!("    Title: {}", remote.title);
                println!("    Files: {}", remote.file_count);

                record.verified = Some(true);
                record.remote_title = Some(remote.title);
                record.remote_files = Some(remote.file_count);
                record.synced_at = Some(remote.synced_at);
                summary.verified += 1;
            }
            None => {
                println!("  ✗ NOT found on archive.org");
                record.verified = Some(false);
            }
        }
    }

    store.save(&history)?;
    println!("\n{}", output::rule());
    println!("Synced {}/{} items", summary.verified, summary.total);

    Ok(summary)
}

/// Fetch every item by `creator` (plus everything in history) and export it
pub async fn fetch_all_by_creator(
    archive: &dyn ArchiveClient,
    store: &HistoryStore,
    creator: &str,
    export_path: &Path,
) -> Result<Vec<ItemDetails>> {
    println!("Fetching all items by: {}", creator);
    println!("{}", output::rule());

    let mut identifiers = match archive.search_by_creator(creator).await {
        Ok(found) => found,
        Err(e) => {
            println!("Error searching: {}", e);
            Vec::new()
        }
    };
    println!("Found {} items via search\n", identifiers.len());

    for identifier in store.load()?.into_keys() {
        if !identifiers.contains(&identifier) {
            identifiers.push(identifier);
        }
    }
    println!("Total identifiers to check: {}\n", identifiers.len());

    let mut items = Vec::new();
    for identifier in &identifiers {
        println!("Fetching: {}", identifier);
        match archive.item_details(identifier).await {
            Ok(Some(details)) => {
                println!("  ✓ {} ({} files)", details.title, details.file_count);
                items.push(details);
            }
            Ok(None) => println!("  ✗ Not found"),
            Err(e) => println!("  ✗ Error: {}", e),
        }
    }

    write_items(export_path, &items)?;
    println!("\n{}", output::rule());
    println!("Saved {} items to {}", items.len(), export_path.display());

    Ok(items)
}

/// Export full details for every history item
pub async fn export_full_data(
    archive: &dyn ArchiveClient,
    store: &HistoryStore,
    export_path: &Path,
) -> Result<Vec<ItemDetails>> {
    println!("Exporting full archive data...");
    println!("{}", output::rule());

    let mut items = Vec::new();
    for identifier in store.load()?.keys() {
        println!("Fetching: {}", identifier);
        match archive.item_details(identifier).await {
            Ok(Some(details)) => {
                println!("  ✓ {} files", details.file_count);
                items.push(details);
            }
            Ok(None) => println!("  ✗ Not found"),
            Err(e) => println!("  ✗ Error: {}", e),
        }
    }

    write_items(export_path, &items)?;
    println!("\n{}", output::rule());
    println!("Exported {} items to {}", items.len(), export_path.display());

    let total_files: usize = items.iter().map(|item| item.file_count).sum();
    println!("\nSummary:");
    println!("  Total items: {}", items.len());
    println!("  Total files: {}", total_files);

    Ok(items)
}

/// Print the locally known status without any network access
pub fn show_status(store: &HistoryStore) -> Result<()> {
    println!("Archive.org Upload Status");
    println!("{}", output::rule());
    print!("{}", output::format_status(&store.load()?));
    println!();
    Ok(())
}

fn write_items(path: &Path, items: &[ItemDetails]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(items).context("Failed to serialize archive items")?;
    fs_err::write(path, content).context("Failed to write archive items")?;
    Ok(())
}
