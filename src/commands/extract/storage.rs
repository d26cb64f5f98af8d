use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::model::{ExtractionResult, Quantity};
use crate::util::{ensure_directory, write_json_pretty};

pub fn save_json(results: &[ExtractionResult], output_dir: &Path) -> Result<()> {
    let json_dir = output_dir.join("json");
    ensure_directory(&json_dir)?;

    for result in results {
        let name = result.metadata.source_pdf.as_deref().unwrap_or("unknown");
        let stem = Path::new(name)
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("unknown");
        write_json_pretty(&json_dir.join(format!("{stem}.json")), result)?;
    }

    Ok(())
}

fn csv_field(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };

    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_number(value: Option<f64>) -> String {
    value.map(|number| number.to_string()).unwrap_or_default()
}

fn write_csv(path: &Path, header: &str, rows: &[Vec<String>]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    writeln!(file, "{header}").with_context(|| format!("failed to write {}", path.display()))?;
    for row in rows {
        writeln!(file, "{}", row.join(","))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(())
}

fn normalize_pages(pages: Option<&str>) -> String {
    let Some(pages) = pages else {
        return String::new();
    };

    let cleaned = pages
        .replace("Page ", "")
        .replace("page ", "")
        .replace(';', ",")
        .replace('|', ",")
        .replace('/', ",");
    cleaned.split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn q_value(quantity: &Option<Quantity>) -> Option<f64> {
    quantity.as_ref().and_then(|quantity| quantity.value)
}

fn q_unit(quantity: &Option<Quantity>) -> Option<String> {
    quantity.as_ref().and_then(|quantity| quantity.unit.clone())
}

pub fn save_csvs(results: &[ExtractionResult], output_dir: &Path) -> Result<()> {
    let mut metadata_rows = Vec::<Vec<String>>::new();
    let mut resource_rows = Vec::<Vec<String>>::new();
    let mut reserve_rows = Vec::<Vec<String>>::new();
    let mut economics_rows = Vec::<Vec<String>>::new();

    for result in results {
        let meta = &result.metadata;
        metadata_rows.push(vec![
            csv_field(meta.source_pdf.as_deref()),
            csv_field(meta.project_name.as_deref()),
            csv_field(meta.company_name.as_deref()),
            csv_field(meta.location_country.as_deref()),
            csv_field(meta.location_region.as_deref()),
            csv_field(meta.report_date.as_deref()),
            csv_field(meta.report_date_raw.as_deref()),
        ]);

        for row in &result.resources {
            resource_rows.push(vec![
                csv_field(meta.source_pdf.as_deref()),
                csv_field(row.category.as_deref()),
                csv_field(row.metal.as_deref()),
                csv_number(row.tonnes.value),
                csv_field(row.tonnes.unit.as_deref()),
                csv_number(row.grade.value),
                csv_field(row.grade.unit.as_deref()),
                csv_number(row.contained_metal.value),
                csv_field(row.contained_metal.unit.as_deref()),
                csv_field(Some(&normalize_pages(row.source_pages.as_deref()))),
            ]);
        }

        for row in &result.reserves {
            reserve_rows.push(vec![
                csv_field(meta.source_pdf.as_deref()),
                csv_field(row.category.as_deref()),
                csv_field(row.metal.as_deref()),
                csv_number(row.tonnes.value),
                csv_field(row.tonnes.unit.as_deref()),
                csv_number(row.grade.value),
                csv_field(row.grade.unit.as_deref()),
                csv_number(row.contained_metal.value),
                csv_field(row.contained_metal.unit.as_deref()),
                csv_field(Some(&normalize_pages(row.source_pages.as_deref()))),
            ]);
        }

        let econ = &result.economics;
        economics_rows.push(vec![
            csv_field(meta.source_pdf.as_deref()),
            csv_number(q_value(&econ.capex)),
            csv_field(q_unit(&econ.capex).as_deref()),
            csv_number(q_value(&econ.opex)),
            csv_field(q_unit(&econ.opex).as_deref()),
            csv_number(q_value(&econ.npv)),
            csv_field(q_unit(&econ.npv).as_deref()),
            csv_number(q_value(&econ.irr)),
            csv_field(q_unit(&econ.irr).as_deref()),
            csv_field(econ.currency.as_deref()),
            csv_field(Some(&normalize_pages(econ.source_pages.as_deref()))),
        ]);
    }

    write_csv(
        &output_dir.join("metadata.csv"),
        "source_pdf,project_name,company_name,location_country,location_region,report_date,report_date_raw",
        &metadata_rows,
    )?;
    write_csv(
        &output_dir.join("resources.csv"),
        "source_pdf,category,metal,tonnes_value,tonnes_unit,grade_value,grade_unit,contained_value,contained_unit,source_pages",
        &resource_rows,
    )?;
    write_csv(
        &output_dir.join("reserves.csv"),
        "source_pdf,category,metal,tonnes_value,tonnes_unit,grade_value,grade_unit,contained_value,contained_unit,source_pages",
        &reserve_rows,
    )?;
    write_csv(
        &output_dir.join("economics.csv"),
        "source_pdf,capex_value,capex_unit,opex_value,opex_unit,npv_value,npv_unit,irr_value,irr_unit,currency,source_pages",
        &economics_rows,
    )?;

    Ok(())
}

const SQLITE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    source_pdf TEXT PRIMARY KEY,
    project_name TEXT,
    company_name TEXT,
    location_country TEXT,
    location_region TEXT,
    report_date TEXT,
    report_date_raw TEXT,
    confidence REAL
);
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_pdf TEXT,
    category TEXT,
    metal TEXT,
    tonnes_value REAL,
    tonnes_unit TEXT,
    grade_value REAL,
    grade_unit TEXT,
    contained_value REAL,
    contained_unit TEXT,
    source_pages TEXT
);
CREATE TABLE IF NOT EXISTS reserves (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_pdf TEXT,
    category TEXT,
    metal TEXT,
    tonnes_value REAL,
    tonnes_unit TEXT,
    grade_value REAL,
    grade_unit TEXT,
    contained_value REAL,
    contained_unit TEXT,
    source_pages TEXT
);
CREATE TABLE IF NOT EXISTS economics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_pdf TEXT,
    capex_value REAL,
    capex_unit TEXT,
    opex_value REAL,
    opex_unit TEXT,
    npv_value REAL,
    npv_unit TEXT,
    irr_value REAL,
    irr_unit TEXT,
    currency TEXT,
    source_pages TEXT
);
";

pub fn save_sqlite(results: &[ExtractionResult], sqlite_path: &Path) -> Result<()> {
    if let Some(parent) = sqlite_path.parent() {
        ensure_directory(parent)?;
    }
    if sqlite_path.exists() {
        fs::remove_file(sqlite_path)
            .with_context(|| format!("failed to reset {}", sqlite_path.display()))?;
    }

    let mut conn = Connection::open(sqlite_path)
        .with_context(|| format!("failed to open {}", sqlite_path.display()))?;
    conn.execute_batch(SQLITE_SCHEMA)
        .context("failed to create extraction tables")?;

    let tx = conn.transaction()?;

    for result in results {
        let meta = &result.metadata;
        tx.execute(
            "
            INSERT OR REPLACE INTO documents
            (source_pdf, project_name, company_name, location_country, location_region,
             report_date, report_date_raw, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                meta.source_pdf,
                meta.project_name,
                meta.company_name,
                meta.location_country,
                meta.location_region,
                meta.report_date,
                meta.report_date_raw,
                result.confidence,
            ],
        )?;

        for row in &result.resources {
            tx.execute(
                "
                INSERT INTO resources
                (source_pdf, category, metal, tonnes_value, tonnes_unit, grade_value, grade_unit,
                 contained_value, contained_unit, source_pages)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    meta.source_pdf,
                    row.category,
                    row.metal,
                    row.tonnes.value,
                    row.tonnes.unit,
                    row.grade.value,
                    row.grade.unit,
                    row.contained_metal.value,
                    row.contained_metal.unit,
                    normalize_pages(row.source_pages.as_deref()),
                ],
            )?;
        }

        for row in &result.reserves {
            tx.execute(
                "
                INSERT INTO reserves
                (source_pdf, category, metal, tonnes_value, tonnes_unit, grade_value, grade_unit,
                 contained_value, contained_unit, source_pages)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    meta.source_pdf,
                    row.category,
                    row.metal,
                    row.tonnes.value,
                    row.tonnes.unit,
                    row.grade.value,
                    row.grade.unit,
                    row.contained_metal.value,
                    row.contained_metal.unit,
                    normalize_pages(row.source_pages.as_deref()),
                ],
            )?;
        }

        let econ = &result.economics;
        tx.execute(
            "
            INSERT INTO economics
            (source_pdf, capex_value, capex_unit, opex_value, opex_unit, npv_value, npv_unit,
             irr_value, irr_unit, currency, source_pages)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                meta.source_pdf,
                q_value(&econ.capex),
                q_unit(&econ.capex),
                q_value(&econ.opex),
                q_unit(&econ.opex),
                q_value(&econ.npv),
                q_unit(&econ.npv),
                q_value(&econ.irr),
                q_unit(&econ.irr),
                econ.currency,
                normalize_pages(econ.source_pages.as_deref()),
            ],
        )?;
    }

    tx.commit().context("failed to commit extraction rows")?;
    Ok(())
}
