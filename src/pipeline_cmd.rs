//! `docdash pipeline run <stage>` and `docdash pipeline full`.

use anyhow::Result;

use docdash_core::relay::{FullRun, Stage, StageOutcome};

use crate::console::Console;

pub async fn run_stage(console: &Console, stage: Stage) -> Result<()> {
    let message = console.relay().run_stage(stage).await?;
    println!("{:<10} ok  {}", stage.as_str(), message);
    Ok(())
}

pub fn print_full_run(run: &FullRun) {
    for report in &run.reports {
        match &report.outcome {
            StageOutcome::Succeeded { message } => {
                println!("{:<10} ok      {}", report.stage.as_str(), message)
            }
            StageOutcome::Failed { error } => {
                println!("{:<10} FAILED  {}", report.stage.as_str(), error)
            }
        }
    }
    let ran = run.reports.len();
    for stage in Stage::ORDER.iter().skip(ran) {
        println!("{:<10} skipped", stage.as_str());
    }
}

pub async fn run_full(console: &Console, json: bool) -> Result<()> {
    let run = console.relay().run_full().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_full_run(&run);
    }
    if let Some(stage) = run.failed_stage() {
        anyhow::bail!("pipeline stopped at stage {}", stage);
    }
    Ok(())
}
