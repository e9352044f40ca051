//! `docdash status` and `docdash classes`.
//!
//! A count whose query failed prints as `n/a`, never as `0`, and the
//! failure itself goes to stderr. A snapshot with every query failed
//! prints "no data".

use anyhow::Result;

use docdash_core::models::{LifecycleStatus, PipelineStatusSnapshot};
use docdash_core::status::StatusRead;

use crate::console::Console;

fn show(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

pub fn print_snapshot(read: &StatusRead) {
    let snap: &PipelineStatusSnapshot = &read.snapshot;

    println!("Pipeline Status");
    println!("===============");
    println!();

    if snap.is_empty() {
        println!("  no data (status queries failed)");
    } else {
        let docs = snap.documents.as_ref();
        println!("  Documents:   {}", show(docs.map(|d| d.total)));
        for status in LifecycleStatus::ALL {
            println!(
                "    {:<20} {}",
                status.as_str(),
                show(docs.map(|d| d.count(status)))
            );
        }
        println!("  Extracted:   {}", show(snap.extracted_documents));
        println!(
            "  Chunked:     {} document(s), {} chunk(s)",
            show(snap.chunks.map(|c| c.chunked_documents)),
            show(snap.chunks.map(|c| c.total_chunks))
        );

        if let Some(split) = snap.outcome_split() {
            println!();
            println!(
                "  Outcome:     {} succeeded / {} errored / {} pending",
                split.succeeded, split.errored, split.pending
            );
        }
    }

    println!();
    println!(
        "  As of {}{}",
        format_ts_iso(snap.taken_at),
        if read.cached { " (cached)" } else { "" }
    );

    for err in &read.errors {
        eprintln!("warning: {} (retry with --refresh)", err);
    }
}

pub async fn run_status(console: &Console, refresh: bool) -> Result<()> {
    let mut cache = console.new_status_cache();
    let read = if refresh {
        console.refresh(&mut cache).await
    } else {
        console.snapshot(&mut cache).await
    };
    print_snapshot(&read);
    if read.snapshot.is_empty() {
        anyhow::bail!("pipeline status unavailable");
    }
    Ok(())
}

pub async fn run_classes(console: &Console) -> Result<()> {
    let mut cache = console.new_status_cache();
    let classes = console.class_breakdown(&mut cache).await?;
    if classes.is_empty() {
        println!("No classified documents.");
        return Ok(());
    }
    println!("  {:<32} {:>6}", "CLASS", "DOCS");
    println!("  {}", "-".repeat(40));
    for c in &classes {
        println!("  {:<32} {:>6}", c.label, c.count);
    }
    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
