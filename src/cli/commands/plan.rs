//! `plan`: show the strategy order for a document without extracting it.

use std::path::Path;
use std::time::Duration;

use console::style;

use crate::chunker::{self, plan_chunks};
use crate::config::Config;
use crate::llm::pricing::estimate_sections_cost;
use crate::models::ExtractionRequest;
use crate::pipeline::Pipeline;
use crate::strategy::Strategy;
use crate::utils::{format_duration, format_size};

pub async fn cmd_plan(config: Config, file: &Path, allow_oversized: bool) -> anyhow::Result<()> {
    let request = ExtractionRequest::from_path(file)
        .await?
        .with_oversized_override(allow_oversized);
    let size = request.size();
    let format = request.detect_format()?;

    println!("\n{}", style(request.display_name()).bold());
    println!("{}", "-".repeat(50));
    println!("  {:<18} {}", "Format:", format);
    println!("  {:<18} {}", "Size:", format_size(size));

    let pages = chunker::count_pages(chunker::default_splitter(), request.shared_bytes(), format)
        .await
        .ok();
    match pages {
        Some(pages) => println!("  {:<18} {}", "Pages:", pages),
        None => println!("  {:<18} {}", "Pages:", style("unreadable").yellow()),
    }

    let pipeline = Pipeline::from_config(config)?;
    let config = pipeline.config();
    let plan = match pipeline.plan(&request) {
        Ok(plan) => plan,
        Err(e) => {
            println!("  {:<18} {}", "Plan:", style(e.to_string()).red());
            return Ok(());
        }
    };

    println!("  {:<18} {}", "Plan:", style(plan.describe()).cyan());
    if plan.requires_confirmation {
        println!(
            "  {:<18} {}",
            "",
            style("past the managed-file threshold, admitted by override").yellow()
        );
    }

    let estimate = Duration::from_secs_f64(config.limits.estimate_processing_secs(size));
    println!("  {:<18} ~{}", "Estimated time:", format_duration(estimate));
    println!(
        "  {:<18} {}",
        "Timeout:",
        format_duration(pipeline.deadline_for(size))
    );

    if let Some(pages) = pages {
        for strategy in plan.strategies() {
            let cost = match strategy {
                Strategy::DirectOcr | Strategy::ChunkedOcr => {
                    Some(pages as f64 * config.ocr.cost_per_page_usd)
                }
                Strategy::ChunkedLlm => plan_chunks(size, pages, config.chunking.llm_budget_bytes)
                    .ok()
                    .map(|ranges| estimate_sections_cost(&config.llm.inline_model, ranges.len())),
                Strategy::ManagedFileLlm => None,
            };
            if let Some(usd) = cost {
                println!("  {:<18} ${:.4} ({})", "Estimated cost:", usd, strategy);
            }
        }
    }

    Ok(())
}
