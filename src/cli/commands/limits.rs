//! `limits`: print the effective size thresholds.

use console::style;

use crate::config::Config;
use crate::utils::{format_duration, format_size};

pub fn cmd_limits(config: &Config) -> anyhow::Result<()> {
    let limits = &config.limits;

    if let Some(path) = &config.source_path {
        println!("{} {}", style("Config:").dim(), path.display());
    }

    println!("\n{}", style("Size thresholds").bold());
    println!("{}", "-".repeat(50));
    let rows = [
        ("Direct OCR up to", limits.comfortable_bytes),
        ("Chunked OCR up to", limits.chunk_bytes),
        ("LLM without override", limits.managed_file_bytes),
        ("Recommended max", limits.recommended_max_bytes),
        ("Absolute max", limits.absolute_max_bytes),
    ];
    for (label, bytes) in rows {
        println!("  {:<22} {}", label, format_size(bytes));
    }

    println!("\n{}", style("Chunk budgets").bold());
    println!("{}", "-".repeat(50));
    println!(
        "  {:<22} {}",
        "OCR per call",
        format_size(config.chunking.ocr_budget_bytes)
    );
    println!(
        "  {:<22} {}",
        "LLM per section",
        format_size(config.chunking.llm_budget_bytes)
    );

    println!("\n{}", style("Execution").bold());
    println!("{}", "-".repeat(50));
    println!(
        "  {:<22} {} × {}ms linear backoff",
        "Retries",
        config.retry.max_attempts,
        config.retry.base_delay_ms
    );
    println!(
        "  {:<22} {}",
        "Inactivity timeout",
        format_duration(config.tracker.inactivity_timeout())
    );
    println!(
        "  {:<22} {} documents, {} files, {}",
        "Batch",
        config.batch.max_concurrent_documents,
        config.batch.max_files_per_batch,
        format_size(config.batch.max_batch_bytes)
    );
    println!(
        "  {:<22} {}/min, {}/hour",
        "Uploads",
        config.uploads.per_minute,
        config.uploads.per_hour
    );
    Ok(())
}
