//! `docdash documents recent` and `docdash documents show <id>`.

use anyhow::Result;

use crate::console::Console;
use crate::status_cmd::format_ts_iso;

pub async fn run_recent(console: &Console, limit: usize) -> Result<()> {
    let docs = console.recent_documents(limit).await?;
    if docs.is_empty() {
        println!("No classified documents.");
        return Ok(());
    }
    println!(
        "  {:<38} {:<28} {:<18} {:<20} {}",
        "DOCUMENT", "FILE", "CLASS", "STATUS", "CLASSIFIED"
    );
    for d in &docs {
        println!(
            "  {:<38} {:<28} {:<18} {:<20} {}",
            d.document_id,
            d.file_name,
            d.document_class,
            d.status.as_str(),
            format_ts_iso(d.classified_at)
        );
    }
    Ok(())
}

pub async fn run_show(console: &Console, id: &str, chunks: Option<usize>) -> Result<()> {
    let detail = console.document_detail(id, chunks).await?;
    let doc = &detail.document;

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("file_name:     {}", doc.file_name);
    println!("file_path:     {}", doc.file_path);
    if let Some(size) = doc.file_size {
        println!("file_size:     {}", size);
    }
    println!("document_type: {}", doc.document_type);
    println!("status:        {}", doc.status);
    println!(
        "class:         {}",
        detail.document_class.as_deref().unwrap_or("(unclassified)")
    );
    if let Some(ts) = detail.classified_at {
        println!("classified_at: {}", format_ts_iso(ts));
    }
    println!();

    println!("--- Attributes ({}) ---", detail.attributes.len());
    for a in &detail.attributes {
        let confidence = a
            .confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "unscored".to_string());
        println!(
            "{:<32} {:<32} {}",
            a.name,
            a.value.as_deref().unwrap_or("(null)"),
            confidence
        );
    }
    println!();

    println!("--- Chunks ({}) ---", detail.chunks.len());
    for chunk in &detail.chunks {
        println!("[chunk {}]", chunk.chunk_index);
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}
