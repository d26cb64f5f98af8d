use regex::Regex;

use crate::cli::ExtractionMode;
use crate::util::clamp_text;

const FOCUS_WINDOW: usize = 12;
const FOCUS_LINES_BEFORE: usize = 2;

/// Merges table and text context into one budget-limited blob. Tables get
/// a fixed 40% share of the budget: they carry dense numeric signal that
/// verbose prose would otherwise crowd out.
pub fn combine_contexts(table_context: &str, text_context: &str, max_chars: usize) -> String {
    if table_context.is_empty() {
        return text_context.to_string();
    }
    if text_context.is_empty() {
        return table_context.to_string();
    }

    let table_budget = (max_chars as f64 * 0.4) as usize;
    let text_budget = max_chars.saturating_sub(table_budget).saturating_sub(2);
    let table_part = clamp_text(table_context, table_budget);
    let text_part = clamp_text(text_context, text_budget);
    format!("{table_part}\n\n{text_part}")
}

/// Narrows a long page-labeled context down to keyword-adjacent lines.
/// Applies only in smart mode once the context reaches `focus_min_chars`;
/// when focusing yields nothing or fails to shrink the text, the
/// unfocused context is returned unchanged.
pub fn focus_context(
    context: String,
    keywords: &[&str],
    mode: ExtractionMode,
    focus_min_chars: usize,
) -> String {
    if mode != ExtractionMode::Smart {
        return context;
    }
    if context.chars().count() < focus_min_chars {
        return context;
    }

    let focused = extract_relevant_page_snippets(&context, keywords, FOCUS_WINDOW);
    if !focused.is_empty() && focused.len() < context.len() {
        focused
    } else {
        context
    }
}

/// Re-scans a `Page N:`-labeled context and keeps, per page, only the
/// lines within a window of a keyword match. Pages with no match are
/// dropped entirely; kept pages retain their label line for traceability.
pub fn extract_relevant_page_snippets(context: &str, keywords: &[&str], window: usize) -> String {
    let Some(label) = Regex::new(r"^Page \d+:$").ok() else {
        return String::new();
    };

    let mut pages = Vec::<(String, Vec<&str>)>::new();
    for line in context.lines() {
        if label.is_match(line.trim_end()) {
            pages.push((line.to_string(), Vec::new()));
        } else if let Some((_, lines)) = pages.last_mut() {
            lines.push(line);
        }
    }

    let lowered: Vec<String> = keywords.iter().map(|keyword| keyword.to_lowercase()).collect();
    let mut kept_pages = Vec::<String>::new();

    for (label_line, lines) in &pages {
        let mut keep = vec![false; lines.len()];
        let mut any_hit = false;

        for (idx, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();
            if lowered.iter().any(|keyword| lower.contains(keyword)) {
                any_hit = true;
                let start = idx.saturating_sub(FOCUS_LINES_BEFORE);
                let end = (idx + window).min(lines.len());
                for flag in &mut keep[start..end] {
                    *flag = true;
                }
            }
        }

        if !any_hit {
            continue;
        }

        let mut snippet = vec![label_line.as_str()];
        snippet.extend(
            lines
                .iter()
                .zip(&keep)
                .filter(|(_, kept)| **kept)
                .map(|(line, _)| *line),
        );
        kept_pages.push(snippet.join("\n"));
    }

    kept_pages.join("\n\n")
}
