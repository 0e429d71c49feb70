//! `extract`: run one document through the pipeline with live status.

use std::path::Path;
use std::time::Duration;

use console::style;

use super::helpers::{show_status, spinner};
use crate::config::Config;
use crate::models::{ExtractionRequest, ExtractionResult};
use crate::pipeline::{new_document_id, Pipeline};
use crate::utils::format_size;

pub async fn cmd_extract(
    config: Config,
    file: &Path,
    allow_oversized: bool,
    lang: Vec<String>,
    output: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let request = ExtractionRequest::from_path(file)
        .await?
        .with_oversized_override(allow_oversized)
        .with_language_hints(lang);

    let pipeline = Pipeline::from_config(config)?;
    let sweeper = pipeline.spawn_sweeper();

    let document_id = new_document_id();
    let pb = spinner(&format!(
        "{} ({})",
        request.display_name(),
        format_size(request.size())
    ))?;

    let submit = pipeline.submit_as(&document_id, request);
    tokio::pin!(submit);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let outcome = loop {
        tokio::select! {
            result = &mut submit => break result,
            _ = ticker.tick() => {
                if let Some(status) = pipeline.status(&document_id).await {
                    show_status(&pb, &status);
                }
            }
        }
    };
    pb.finish_and_clear();
    sweeper.shutdown().await;

    let result = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    match output {
        Some(path) => {
            tokio::fs::write(path, &result.text).await?;
            print_summary(&result);
            eprintln!("  Wrote {}", style(path.display()).cyan());
        }
        None if json => {}
        None => {
            println!("{}", result.text);
            print_summary(&result);
        }
    }
    Ok(())
}

pub(super) fn print_summary(result: &ExtractionResult) {
    eprintln!(
        "{} {} via {}: {} pages, {} words, confidence {:.2}, ${:.4}, {:.1}s",
        style("✓").green(),
        result.filename.as_deref().unwrap_or(&result.document_id),
        style(result.strategy).cyan(),
        result.total_pages,
        result.word_count(),
        result.confidence,
        result.cost.usd,
        result.elapsed_ms as f64 / 1000.0
    );
    for attempt in &result.failed_strategies {
        eprintln!(
            "  {} {} failed: {}",
            style("!").yellow(),
            attempt.strategy,
            attempt.error
        );
    }
    if result.is_partial() {
        eprintln!(
            "  {} no text from pages {}",
            style("!").yellow(),
            result.failed_pages.join(", ")
        );
    }
}
