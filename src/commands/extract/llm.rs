use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;

use crate::cli::LlmProvider;
use crate::semantic::qualified_model;

use super::selector::Section;

const GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SYSTEM_PROMPT: &str = "\
You are a data extraction engine for NI 43-101 mining technical reports.
Extract ONLY the fields in the provided JSON schema. Return valid JSON and nothing else.
If a field is missing, set it to null or [] as appropriate.
Do not convert units or scale values; keep value as shown in the document.
Fill `raw` with the original string and `unit` with the unit text if present.
Use source_pages only from Page N references in the provided context. Ignore table of contents page numbers.
Use the document content only; do not guess.
Tables may appear as CSV/TSV text; use the headers and numeric rows to extract values.";

pub fn section_task(section: Section) -> &'static str {
    match section {
        Section::Metadata => {
            "Extract project metadata (project name, company name, location country/region, \
             report date). Use report_date in ISO format if possible and keep the original in \
             report_date_raw."
        }
        Section::Resources => {
            "Extract mineral resources (Measured, Indicated, Inferred). If a combined category \
             appears (e.g., Measured + Indicated), capture it as its own row. For each row \
             include category, tonnes, grade, metal, contained_metal, and source_pages."
        }
        Section::Reserves => {
            "Extract mineral reserves (Proven, Probable). If a combined category appears \
             (e.g., Proven + Probable), capture it as its own row. Do not invent reserves if \
             only resource categories are present. For each row include category, tonnes, \
             grade, metal, contained_metal, and source_pages."
        }
        Section::Economics => {
            "Extract CAPEX, OPEX, NPV, and IRR with units and currency when available. Return \
             null when a field is not present."
        }
    }
}

/// Queries the configured provider with a schema-bearing prompt and
/// deserializes the response into `T`. The mock provider returns the
/// schema default deterministically; gemini without a credential is a
/// configuration error for this one call.
pub fn extract_with_schema<T>(
    document_text: &str,
    model_name: &str,
    provider: LlmProvider,
    api_key: Option<&str>,
    schema: &serde_json::Value,
    task: Option<&str>,
) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match provider {
        LlmProvider::Mock => Ok(T::default()),
        LlmProvider::Gemini => {
            let Some(api_key) = api_key else {
                bail!("GEMINI_API_KEY is required for gemini extraction");
            };

            let prompt = build_prompt(document_text, schema, task)?;
            let raw = call_gemini(model_name, api_key, &prompt)?;
            let value = parse_json_object(&raw)?;
            serde_json::from_value(value)
                .context("model response did not match the expected schema")
        }
    }
}

fn build_prompt(
    document_text: &str,
    schema: &serde_json::Value,
    task: Option<&str>,
) -> Result<String> {
    let schema_text =
        serde_json::to_string_pretty(schema).context("failed to render json schema")?;

    let mut prompt = String::from(SYSTEM_PROMPT);
    if let Some(task) = task {
        prompt.push_str("\n\nTask: ");
        prompt.push_str(task);
        prompt.push('\n');
    }
    prompt.push_str("\nJSON schema:\n");
    prompt.push_str(&schema_text);
    prompt.push_str("\n\nDocument content:\n");
    prompt.push_str(document_text);

    Ok(prompt)
}

fn call_gemini(model_name: &str, api_key: &str, prompt: &str) -> Result<String> {
    let model = qualified_model(model_name);
    let url = format!("{GENAI_BASE_URL}/{model}:generateContent?key={api_key}");
    let body = serde_json::json!({
        "contents": [ { "parts": [ { "text": prompt } ] } ],
        "generationConfig": { "temperature": 0.1 },
    });

    let response = ureq::post(&url)
        .send_json(body)
        .with_context(|| format!("generateContent request failed for {model}"))?;
    let value: serde_json::Value = response
        .into_json()
        .context("failed to decode generateContent response")?;

    response_text(&value)
}

fn response_text(value: &serde_json::Value) -> Result<String> {
    let parts = value
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array());

    let Some(parts) = parts else {
        bail!("no candidates in model response");
    };

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|text| text.as_str()))
        .collect();

    if text.trim().is_empty() {
        bail!("model response contained no text");
    }

    Ok(text)
}

/// Parses the response as JSON, with one repair attempt: extract the
/// first balanced brace-delimited object from the raw text.
pub fn parse_json_object(text: &str) -> Result<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        return Ok(value);
    }

    let Some(candidate) = first_balanced_object(text) else {
        bail!("no JSON object found in model response");
    };
    serde_json::from_str(candidate).context("failed to parse repaired JSON object")
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        match *byte {
            b'\\' if in_string && !escaped => {
                escaped = true;
                continue;
            }
            b'"' if !escaped => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
        escaped = false;
    }

    None
}
