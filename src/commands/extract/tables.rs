use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::process::Command;

use regex::Regex;
use tracing::debug;

use crate::util::{clamp_text, sha256_hex};

use super::pages::command_available;
use super::selector::Section;

pub const MAX_TABLES_PER_SECTION: usize = 8;
pub const TABLE_CONTEXT_MAX_ROWS: usize = 40;
pub const TABLE_CONTEXT_MAX_CHARS: usize = 60_000;

/// One raw transcript of a detected tabular region on one page. `page` is
/// 1-based to match the `Page N:` labels the model sees.
#[derive(Debug, Clone)]
pub struct CandidateTable {
    pub page: usize,
    pub method: &'static str,
    pub text: String,
}

/// Table detection capability. Implementations are heuristic and noisy;
/// an empty result is a first-class outcome, never an error.
pub trait TableDetector {
    fn name(&self) -> &'static str;
    fn detect(&self, pdf_path: &Path, page_indices: &[usize]) -> Vec<CandidateTable>;
}

fn page_layout_text(pdf_path: &Path, page_number: usize) -> Option<String> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg("-f")
        .arg(page_number.to_string())
        .arg("-l")
        .arg(page_number.to_string())
        .arg(pdf_path)
        .arg("-")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    Some(String::from_utf8_lossy(&output.stdout).replace('\u{0000}', ""))
}

/// Carves runs of column-aligned lines out of layout-mode text.
struct LayoutTableDetector;

impl TableDetector for LayoutTableDetector {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn detect(&self, pdf_path: &Path, page_indices: &[usize]) -> Vec<CandidateTable> {
        let gap = Regex::new(r" {2,}").ok();
        let mut tables = Vec::<CandidateTable>::new();

        for idx in page_indices {
            let page_number = idx + 1;
            let Some(text) = page_layout_text(pdf_path, page_number) else {
                continue;
            };

            for block in columnar_blocks(&text) {
                let rows: Vec<String> = block
                    .iter()
                    .map(|line| split_columns(line, gap.as_ref()))
                    .collect();
                let body = rows.join("\n");
                if !body.trim().is_empty() {
                    tables.push(CandidateTable {
                        page: page_number,
                        method: "layout",
                        text: body,
                    });
                }
            }
        }

        tables
    }
}

fn is_columnar_line(line: &str) -> bool {
    line.matches("  ").count() >= 2
        && line
            .chars()
            .any(|character| character.is_ascii_digit())
}

fn columnar_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::<Vec<&str>>::new();
    let mut current = Vec::<&str>::new();

    for line in text.lines() {
        if is_columnar_line(line) {
            current.push(line);
        } else {
            if current.len() >= 3 {
                blocks.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= 3 {
        blocks.push(current);
    }

    blocks
}

fn split_columns(line: &str, gap: Option<&Regex>) -> String {
    match gap {
        Some(pattern) => pattern
            .split(line.trim())
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<&str>>()
            .join("\t"),
        None => line.trim().to_string(),
    }
}

/// Grabs the block of lines following a `Table N` caption.
struct CaptionTableDetector;

const CAPTION_MAX_LINES: usize = 30;

impl TableDetector for CaptionTableDetector {
    fn name(&self) -> &'static str {
        "caption"
    }

    fn detect(&self, pdf_path: &Path, page_indices: &[usize]) -> Vec<CandidateTable> {
        let Some(caption) = Regex::new(r"(?i)^\s*table\s+\d+(?:[-.]\d+)?\b").ok() else {
            return Vec::new();
        };
        let mut tables = Vec::<CandidateTable>::new();

        for idx in page_indices {
            let page_number = idx + 1;
            let Some(text) = page_layout_text(pdf_path, page_number) else {
                continue;
            };
            let lines: Vec<&str> = text.lines().collect();

            for (position, line) in lines.iter().enumerate() {
                if !caption.is_match(line) {
                    continue;
                }

                let mut block = Vec::<&str>::new();
                let mut blank_run = 0_usize;
                for candidate in lines.iter().copied().skip(position).take(CAPTION_MAX_LINES) {
                    if candidate.trim().is_empty() {
                        blank_run += 1;
                        if blank_run >= 2 {
                            break;
                        }
                    } else {
                        blank_run = 0;
                    }
                    block.push(candidate);
                }

                let body = block.join("\n").trim().to_string();
                let has_digits = body
                    .chars()
                    .any(|character| character.is_ascii_digit());
                if block.len() >= 2 && has_digits {
                    tables.push(CandidateTable {
                        page: page_number,
                        method: "caption",
                        text: body,
                    });
                }
            }
        }

        tables
    }
}

fn detectors() -> Vec<Box<dyn TableDetector>> {
    if command_available("pdftotext") {
        vec![Box::new(LayoutTableDetector), Box::new(CaptionTableDetector)]
    } else {
        debug!("pdftotext unavailable; table detection disabled");
        Vec::new()
    }
}

pub fn extract_tables_for_pages(pdf_path: &Path, page_indices: &[usize]) -> Vec<CandidateTable> {
    if page_indices.is_empty() {
        return Vec::new();
    }

    let mut tables = Vec::<CandidateTable>::new();
    for detector in detectors() {
        let detected = detector.detect(pdf_path, page_indices);
        debug!(
            pdf = %pdf_path.display(),
            method = detector.name(),
            tables = detected.len(),
            "table detection pass"
        );
        tables.extend(detected);
    }
    tables
}

fn score_table(text: &str, keywords: &[&str]) -> f64 {
    let lower = text.to_lowercase();
    let keyword_hits = keywords
        .iter()
        .filter(|keyword| lower.contains(**keyword))
        .count();
    let dense_rows = text
        .lines()
        .filter(|line| line.matches(',').count() + line.matches('\t').count() >= 2)
        .count();
    let digits = text
        .chars()
        .filter(|character| character.is_ascii_digit())
        .count();

    3.0 * keyword_hits as f64 + dense_rows as f64 + (digits as f64 / 50.0).min(5.0)
}

/// Deduplicates raw transcripts by content hash, scores them against the
/// section keywords, and keeps the top `max_tables`. When no table scores
/// at all the unscored order is kept: a numeric table with no topical
/// keyword is still evidence.
pub fn filter_tables_for_section(
    tables: Vec<CandidateTable>,
    section: Section,
    max_tables: usize,
) -> Vec<CandidateTable> {
    let keywords = section.config().keywords;

    let mut seen = HashSet::<String>::new();
    let mut deduped = Vec::<CandidateTable>::new();
    for table in tables {
        if seen.insert(sha256_hex(&table.text)) {
            deduped.push(table);
        }
    }

    let scored: Vec<(f64, CandidateTable)> = deduped
        .into_iter()
        .map(|table| (score_table(&table.text, keywords), table))
        .collect();

    if scored.iter().all(|(score, _)| *score == 0.0) {
        return scored
            .into_iter()
            .take(max_tables)
            .map(|(_, table)| table)
            .collect();
    }

    let mut positive: Vec<(f64, CandidateTable)> = scored
        .into_iter()
        .filter(|(score, _)| *score > 0.0)
        .collect();
    positive.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    positive
        .into_iter()
        .take(max_tables)
        .map(|(_, table)| table)
        .collect()
}

pub fn build_table_context(tables: &[CandidateTable], max_rows: usize, max_chars: usize) -> String {
    let mut chunks = Vec::<String>::new();
    for table in tables {
        if table.text.is_empty() {
            continue;
        }
        let body = table
            .text
            .lines()
            .take(max_rows)
            .collect::<Vec<&str>>()
            .join("\n");
        chunks.push(format!("Page {} ({}):\n{}", table.page, table.method, body));
    }

    clamp_text(&chunks.join("\n\n"), max_chars).to_string()
}
