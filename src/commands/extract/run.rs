use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use tracing::info;

use crate::cli::ExtractArgs;
use crate::commands::inventory::discover_pdfs;
use crate::model::{DocumentMetrics, ExtractionResult, RunManifest};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::document::process_document;
use super::settings::ExtractSettings;
use super::storage::{save_csvs, save_json, save_sqlite};

pub fn run(args: ExtractArgs) -> Result<()> {
    let settings = ExtractSettings::resolve(&args);
    ensure_directory(&settings.output_dir)?;

    let mut pdfs = discover_pdfs(&settings.data_dir)?;
    pdfs.sort();
    if let Some(limit) = settings.limit {
        pdfs.truncate(limit);
    }

    let run_id = format!("run-{}", utc_compact_string(Utc::now()));
    let started_at = now_utc_string();
    let run_started = Instant::now();
    info!(
        run_id = %run_id,
        pdfs = pdfs.len(),
        strategy = settings.strategy.as_str(),
        workers = settings.workers,
        dry_run = settings.dry_run,
        "run start"
    );

    // Workers complete in any order; results land in input order. The
    // shared page/embedding caches are content-addressed, so racing
    // writers on the same key produce equivalent entries.
    let outcomes: Vec<(ExtractionResult, DocumentMetrics)> =
        if settings.workers > 1 && pdfs.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(settings.workers)
                .build()
                .context("failed to build worker pool")?;
            pool.install(|| {
                pdfs.par_iter()
                    .map(|pdf| process_document(pdf, &settings))
                    .collect()
            })
        } else {
            pdfs.iter()
                .map(|pdf| process_document(pdf, &settings))
                .collect()
        };

    let (results, metrics): (Vec<ExtractionResult>, Vec<DocumentMetrics>) =
        outcomes.into_iter().unzip();

    save_json(&results, &settings.output_dir)?;
    save_csvs(&results, &settings.output_dir)?;
    save_sqlite(&results, &settings.sqlite_path)?;

    let duration_ms = run_started.elapsed().as_millis() as u64;
    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        started_at,
        duration_ms,
        settings: settings.summary(),
        documents: metrics,
    };
    let manifest_path = settings.output_dir.join("run_manifest.json");
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        duration_ms,
        pdfs = manifest.documents.len(),
        path = %manifest_path.display(),
        "run end"
    );

    Ok(())
}
