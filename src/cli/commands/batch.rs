//! `batch`: validated, bounded multi-document extraction.

use std::path::{Path, PathBuf};

use console::style;

use super::extract::print_summary;
use super::helpers::truncate;
use crate::config::Config;
use crate::models::ExtractionRequest;
use crate::pipeline::{BatchSummary, Pipeline};

pub async fn cmd_batch(
    config: Config,
    files: &[PathBuf],
    output_dir: Option<&Path>,
    lang: Vec<String>,
) -> anyhow::Result<()> {
    let mut requests = Vec::with_capacity(files.len());
    for file in files {
        let request = ExtractionRequest::from_path(file)
            .await?
            .with_language_hints(lang.iter().cloned());
        requests.push(request);
    }

    if let Some(dir) = output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let pipeline = Pipeline::from_config(config)?;
    let sweeper = pipeline.spawn_sweeper();
    println!(
        "{} Extracting {} documents ({} at a time)",
        style("→").cyan(),
        requests.len(),
        pipeline.config().batch.max_concurrent_documents
    );

    let items = pipeline.submit_batch(requests).await;
    sweeper.shutdown().await;
    let items = items?;

    for item in &items {
        match &item.result {
            Ok(result) => {
                print_summary(result);
                if let Some(dir) = output_dir {
                    let path = dir.join(output_name(&item.name));
                    tokio::fs::write(&path, &result.text).await?;
                    println!("  Wrote {}", style(path.display()).dim());
                }
            }
            Err(e) => {
                println!(
                    "{} {}: {}",
                    style("✗").red(),
                    item.name,
                    truncate(&e.to_string(), 200)
                );
            }
        }
    }

    let summary = BatchSummary::from_items(&items);
    println!(
        "\n{} succeeded, {} failed",
        style(summary.succeeded).green(),
        style(summary.failed).red()
    );
    if summary.failed > 0 {
        anyhow::bail!("{} of {} documents failed", summary.failed, items.len());
    }
    Ok(())
}

/// `report.pdf` becomes `report.txt`.
fn output_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    format!("{}.txt", stem)
}
