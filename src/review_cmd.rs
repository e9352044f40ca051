//! `docdash review …` commands.

use anyhow::Result;

use docdash_core::review::{ConfidenceBand, ReviewError};

use crate::console::Console;

fn band_marker(band: ConfidenceBand) -> &'static str {
    match band {
        ConfidenceBand::Unscored => "?",
        ConfidenceBand::Critical => "!!!",
        ConfidenceBand::Warning => "!!",
        ConfidenceBand::Caution => "!",
        ConfidenceBand::Accepted => "",
    }
}

pub async fn run_list(
    console: &Console,
    document_id: &str,
    threshold: f64,
    all: bool,
) -> Result<()> {
    let rows = if all {
        console.review().list_attributes(document_id, threshold).await?
    } else {
        console
            .review()
            .list_review_candidates(document_id, threshold)
            .await?
    };

    if rows.is_empty() {
        println!(
            "No attributes below confidence {:.2} on {}.",
            threshold, document_id
        );
        return Ok(());
    }

    println!(
        "  {:<4} {:<32} {:<32} {:>8}  {}",
        "", "ATTRIBUTE", "VALUE", "CONF", "BAND"
    );
    for c in &rows {
        let a = &c.attribute;
        println!(
            "  {:<4} {:<32} {:<32} {:>8}  {}",
            band_marker(c.band),
            a.name,
            a.value.as_deref().unwrap_or("(null)"),
            a.confidence
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string()),
            c.band.as_str()
        );
    }
    Ok(())
}

pub async fn run_approve(
    console: &Console,
    document_id: &str,
    attribute: &str,
    value: &str,
) -> Result<()> {
    console.review().approve(document_id, attribute, value).await?;
    println!("approved {} = {:?} (confidence 1.00)", attribute, value);
    Ok(())
}

pub async fn run_deny(console: &Console, document_id: &str, attribute: &str) -> Result<()> {
    console.review().deny(document_id, attribute).await?;
    println!("denied {} (value cleared, confidence 0.00)", attribute);
    Ok(())
}

pub async fn run_bulk(
    console: &Console,
    document_id: &str,
    threshold: f64,
    approve: bool,
) -> Result<()> {
    let result = if approve {
        console.review().bulk_approve(document_id, threshold).await
    } else {
        console.review().bulk_deny(document_id, threshold).await
    };
    let verb = if approve { "approved" } else { "denied" };

    match result {
        Ok(n) => {
            println!("{} {} attribute(s) below {:.2}", verb, n, threshold);
            Ok(())
        }
        Err(e @ ReviewError::PartiallyApplied { .. }) => {
            eprintln!(
                "{} only {} attribute(s) before failing; run `docdash review list {}` to see what is left",
                verb,
                e.applied().unwrap_or(0),
                document_id
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
