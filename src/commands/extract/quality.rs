use crate::model::{ExtractionResult, MineralReserve, MineralResource, QualityMetrics};

use super::selector::Section;

/// Accept empty categories (the row may still carry a total), anything
/// mentioning proven/probable, and the usual P&P shorthands. Everything
/// else is a resource category the model mislabeled as a reserve.
fn is_reserve_category(category: Option<&str>) -> bool {
    let Some(category) = category else {
        return true;
    };
    if category.trim().is_empty() {
        return true;
    }

    let lower = category.to_lowercase();
    if lower.contains("proven") || lower.contains("probable") {
        return true;
    }
    lower.contains("p&p") || lower.contains("p+p") || lower.trim() == "pp"
}

fn resource_row_has_values(row: &MineralResource) -> bool {
    row.tonnes.has_value() || row.grade.has_value() || row.contained_metal.has_value()
}

fn reserve_row_has_values(row: &MineralReserve) -> bool {
    row.tonnes.has_value() || row.grade.has_value() || row.contained_metal.has_value()
}

/// Post-hoc validation pass: removes invalid reserve rows, computes
/// completeness metrics, and emits warnings gated by the sections the
/// caller actually requested. Pure; mutates the result exactly once.
pub fn apply_quality_checks(
    result: &mut ExtractionResult,
    sections: &[Section],
) -> (QualityMetrics, Vec<String>) {
    let mut warnings = Vec::<String>::new();

    if sections.contains(&Section::Reserves) {
        let mut kept = Vec::<MineralReserve>::with_capacity(result.reserves.len());
        for row in result.reserves.drain(..) {
            if is_reserve_category(row.category.as_deref()) {
                kept.push(row);
            } else {
                warnings.push(format!(
                    "reserve category filtered: {}",
                    row.category.clone().unwrap_or_default()
                ));
            }
        }
        result.reserves = kept;
    }

    let resource_empty = result
        .resources
        .iter()
        .filter(|row| !resource_row_has_values(row))
        .count();
    let reserve_empty = result
        .reserves
        .iter()
        .filter(|row| !reserve_row_has_values(row))
        .count();
    let economics_has_values = result.economics.any_value();

    let metrics = QualityMetrics {
        resources_count: result.resources.len(),
        reserves_count: result.reserves.len(),
        resource_empty_rows: resource_empty,
        reserve_empty_rows: reserve_empty,
        economics_has_values,
        metadata_filled: result.metadata.is_filled(),
    };

    if sections.contains(&Section::Resources) && resource_empty > 0 {
        warnings.push(format!("resources with empty quantities: {resource_empty}"));
    }
    if sections.contains(&Section::Reserves) && reserve_empty > 0 {
        warnings.push(format!("reserves with empty quantities: {reserve_empty}"));
    }
    if sections.contains(&Section::Economics) && !economics_has_values {
        warnings.push("economics missing numeric values".to_string());
    }

    (metrics, warnings)
}
