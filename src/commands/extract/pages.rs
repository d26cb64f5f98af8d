use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::{ensure_directory, sha256_hex};

#[derive(Debug, Serialize, Deserialize)]
struct PageCachePayload {
    signature: String,
    pages: Vec<String>,
}

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

fn cache_signature(pdf_path: &Path) -> Option<String> {
    let metadata = fs::metadata(pdf_path).ok()?;
    let modified_ns = metadata
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_nanos();
    Some(format!("{}:{}", modified_ns, metadata.len()))
}

fn cache_path(pdf_path: &Path, cache_dir: &Path) -> PathBuf {
    let digest = sha256_hex(&pdf_path.display().to_string());
    let stem = pdf_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf");
    cache_dir.join(format!("{stem}-{}.json", &digest[..12]))
}

/// Extracts one text blob per page, reusing a cached extraction when the
/// file's `mtime:size` signature still matches. This boundary never
/// raises: any extraction failure degrades to a single empty page.
pub fn extract_document_pages(pdf_path: &Path, cache_dir: &Path) -> (Vec<String>, bool) {
    let signature = cache_signature(pdf_path);
    let cache_file = cache_path(pdf_path, cache_dir);

    if let (Some(signature), Ok(raw)) = (&signature, fs::read(&cache_file)) {
        if let Ok(payload) = serde_json::from_slice::<PageCachePayload>(&raw) {
            if &payload.signature == signature {
                return (payload.pages, true);
            }
        }
    }

    let pages = run_pdftotext(pdf_path);

    if let Some(signature) = signature {
        if ensure_directory(cache_dir).is_ok() {
            let payload = PageCachePayload {
                signature,
                pages: pages.clone(),
            };
            match serde_json::to_vec(&payload) {
                Ok(data) => {
                    if let Err(error) = fs::write(&cache_file, data) {
                        warn!(
                            path = %cache_file.display(),
                            error = %error,
                            "failed to write page cache entry"
                        );
                    }
                }
                Err(error) => {
                    warn!(error = %error, "failed to serialize page cache entry");
                }
            }
        }
    }

    (pages, false)
}

fn run_pdftotext(pdf_path: &Path) -> Vec<String> {
    let output = match Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
    {
        Ok(output) => output,
        Err(error) => {
            warn!(
                pdf = %pdf_path.display(),
                error = %error,
                "failed to execute pdftotext"
            );
            return vec![String::new()];
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            pdf = %pdf_path.display(),
            stderr = %stderr.trim(),
            "pdftotext returned non-zero exit status"
        );
        return vec![String::new()];
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    // pdftotext emits a trailing form feed after the last page.
    if pages.len() > 1
        && pages
            .last()
            .map(|page| page.trim().is_empty())
            .unwrap_or(false)
    {
        pages.pop();
    }

    pages
}
