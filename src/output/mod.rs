//! Console rendering for reports, history listings and sync status.

use console::style;

use crate::history::UploadHistory;
use crate::upload::{UploadReport, UploadStatus};

const RULE_WIDTH: usize = 60;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Banner printed before a folder is processed
pub fn print_banner(title: &str) {
    println!("{}", rule());
    println!("{}", title);
    println!("{}", rule());
}

/// One-line summary of an upload run
pub fn format_summary(report: &UploadReport) -> String {
    format!(
        "Uploaded: {} this run ({} total) | Pending: {} | Failed: {}",
        report.uploaded.len(),
        report.total_uploaded,
        report.pending,
        report.failed.len()
    )
}

/// Summary plus what the user should do next
pub fn print_upload_report(report: &UploadReport) {
    println!("\n  {}", format_summary(report));

    match &report.status {
        UploadStatus::Complete => {
            println!("  {}", style("All files uploaded").green());
        }
        UploadStatus::Failed => {
            println!(
                "  {} {}",
                style("Some files were rejected:").red(),
                report.failed.join(", ")
            );
            println!("  Checkpoint kept. Re-run this command to retry them.");
        }
        UploadStatus::Aborted { file, reason } => {
            println!(
                "  {} at {}: {}",
                style("Upload interrupted").yellow(),
                file,
                reason
            );
            println!("  Progress saved. Re-run this command to continue.");
        }
    }
}

/// Listing for the `history` command
pub fn format_history(history: &UploadHistory) -> String {
    if history.is_empty() {
        return "No upload history yet.".to_string();
    }

    let mut out = String::from("Upload History:\n");
    out.push_str(&"-".repeat(RULE_WIDTH));
    out.push('\n');
    for (identifier, record) in history {
        out.push_str(&format!("  {}\n", identifier));
        out.push_str(&format!("    Folder: {}\n", record.folder));
        out.push_str(&format!("    Date:   {}\n", record.uploaded.to_rfc3339()));
        out.push_str(&format!("    Files:  {}\n", record.files));
        out.push_str(&format!("    URL:    {}\n\n", record.url));
    }
    out
}

/// Listing for `sync --status`
pub fn format_status(history: &UploadHistory) -> String {
    if history.is_empty() {
        return "No items in upload history.".to_string();
    }

    let mut out = String::new();
    for (identifier, record) in history {
        let marker = match record.verified {
            Some(true) => "✓",
            Some(false) => "✗",
            None => "?",
        };
        out.push_str(&format!("\n{} {}\n", marker, identifier));
        out.push_str(&format!("    Folder: {}\n", record.folder));
        out.push_str(&format!("    Files:  {}\n", record.files));
        out.push_str(&format!("    URL:    {}\n", record.url));
        if let Some(synced_at) = &record.synced_at {
            out.push_str(&format!("    Synced: {}\n", synced_at.to_rfc3339()));
        }
    }
    out
}
