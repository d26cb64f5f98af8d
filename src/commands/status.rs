use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::RunManifest;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_path = args.output_dir.join("run_manifest.json");
    let page_cache_dir = args.output_dir.join("cache").join("pages");
    let embedding_cache_dir = args.output_dir.join("cache").join("embeddings");
    let db_path = args.output_dir.join("extractions.db");

    info!(output_dir = %args.output_dir.display(), "status requested");

    if manifest_path.exists() {
        let raw = fs::read(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: RunManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

        let warning_count: usize = manifest
            .documents
            .iter()
            .map(|document| document.warnings.len())
            .sum();

        info!(
            run_id = %manifest.run_id,
            started_at = %manifest.started_at,
            duration_ms = manifest.duration_ms,
            documents = manifest.documents.len(),
            warnings = warning_count,
            strategy = %manifest.settings.strategy,
            provider = %manifest.settings.provider,
            dry_run = manifest.settings.dry_run,
            "loaded run manifest"
        );
    } else {
        warn!(path = %manifest_path.display(), "run manifest missing");
    }

    info!(
        page_cache_entries = count_files(&page_cache_dir),
        embedding_cache_entries = count_files(&embedding_cache_dir),
        "cache status"
    );

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let documents = query_count(&conn, "SELECT COUNT(*) FROM documents").unwrap_or(0);
        let resources = query_count(&conn, "SELECT COUNT(*) FROM resources").unwrap_or(0);
        let reserves = query_count(&conn, "SELECT COUNT(*) FROM reserves").unwrap_or(0);
        let economics = query_count(&conn, "SELECT COUNT(*) FROM economics").unwrap_or(0);

        info!(
            path = %db_path.display(),
            documents,
            resources,
            reserves,
            economics,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| entries.filter_map(|entry| entry.ok()).count())
        .unwrap_or(0)
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
