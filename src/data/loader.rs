use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
};
use arrow::datatypes::{DataType, Date32Type};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::error::DataLoadError;
use super::model::{RawTable, RecordSet, Value};

/// Cell spellings read as missing.
const NA_VALUES: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "<NA>"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load the incident dataset and derive its calendar fields.
///
/// Date cells that fail to parse are nulled and logged, never fatal.
pub fn load_records(path: &Path) -> Result<RecordSet, DataLoadError> {
    let raw = load_file(path)?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("column cardinalities: {:?}", column_cardinalities(&raw));
    }
    let (records, warnings) = RecordSet::from_raw(raw, &path.display().to_string())?;

    for warning in &warnings {
        log::debug!("{}: {warning}", path.display());
    }
    if !warnings.is_empty() {
        log::warn!(
            "{}: {} cell(s) could not be parsed and were treated as null",
            path.display(),
            warnings.len()
        );
    }
    log::info!(
        "loaded {} incident records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Load any supported tabular file into an untyped [`RawTable`].
/// Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row plus one row per record
/// * `.json`    – `[{ "Country": ..., "Date": ..., ... }, ...]`
/// * `.parquet` – any flat schema of scalar columns
pub fn load_file(path: &Path) -> Result<RawTable, DataLoadError> {
    std::fs::metadata(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let loaded = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => return Err(DataLoadError::UnsupportedFormat(other.to_string())),
    };

    loaded.map_err(|err| DataLoadError::Malformed {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one record per line.
fn load_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let columns: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if columns.iter().all(|c| c.is_empty()) {
        bail!("CSV has no header row");
    }

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(record.iter().map(guess_value_type).collect());
    }

    Ok(RawTable { columns, rows })
}

pub(crate) fn guess_value_type(s: &str) -> Value {
    if NA_VALUES.contains(&s.trim()) {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    if s == "True" || s == "False" {
        return Value::Bool(s == "True");
    }
    Value::Text(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "Violation_ID": "V1", "Country": "Syria", "Date": "2020-01-05", ... },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .into_iter()
        .map(|obj| {
            columns
                .iter()
                .map(|col| obj.get(col).map_or(Value::Null, json_to_value))
                .collect()
        })
        .collect();

    Ok(RawTable { columns, rows })
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of scalar columns.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`). Date and timestamp columns come through
/// as dates or their display text and are parsed like CSV dates.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    let format_options = FormatOptions::default();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        let formatters = batch
            .columns()
            .iter()
            .map(|col| ArrayFormatter::try_new(col.as_ref(), &format_options))
            .collect::<Result<Vec<_>, _>>()
            .context("preparing column formatters")?;

        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(columns.len());
            for (col, formatter) in batch.columns().iter().zip(&formatters) {
                let value = extract_value(col, row)
                    .unwrap_or_else(|| Value::Text(formatter.value(row).to_string()));
                cells.push(value);
            }
            rows.push(cells);
        }
    }

    Ok(RawTable { columns, rows })
}

// -- Parquet / Arrow helpers --

/// Extract a single cell from an Arrow column at a given row.
/// `None` means the type has no direct mapping and should be formatted.
fn extract_value(col: &Arc<dyn Array>, row: usize) -> Option<Value> {
    if col.is_null(row) {
        return Some(Value::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => Value::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => {
            let arr = col.as_any().downcast_ref::<Int32Array>()?;
            Value::Integer(arr.value(row) as i64)
        }
        DataType::Int64 => {
            let arr = col.as_any().downcast_ref::<Int64Array>()?;
            Value::Integer(arr.value(row))
        }
        DataType::Float32 => {
            let arr = col.as_any().downcast_ref::<Float32Array>()?;
            Value::Float(arr.value(row) as f64)
        }
        DataType::Float64 => {
            let arr = col.as_any().downcast_ref::<Float64Array>()?;
            let v = arr.value(row);
            if v.is_nan() {
                Value::Null
            } else {
                Value::Float(v)
            }
        }
        DataType::Boolean => {
            let arr = col.as_any().downcast_ref::<BooleanArray>()?;
            Value::Bool(arr.value(row))
        }
        DataType::Date32 => Value::Date(col.as_primitive::<Date32Type>().value_as_date(row)?),
        _ => return None,
    };
    Some(value)
}

/// Column name → distinct value count, for load-time debugging.
pub fn column_cardinalities(raw: &RawTable) -> BTreeMap<String, usize> {
    raw.columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let distinct: std::collections::BTreeSet<&Value> =
                raw.rows.iter().filter_map(|r| r.get(i)).collect();
            (col.clone(), distinct.len())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_cell_types() {
        assert_eq!(guess_value_type(""), Value::Null);
        assert_eq!(guess_value_type("NaN"), Value::Null);
        assert_eq!(guess_value_type("N/A"), Value::Null);
        assert_eq!(guess_value_type("12"), Value::Integer(12));
        assert_eq!(guess_value_type("-0.25"), Value::Float(-0.25));
        assert_eq!(guess_value_type("True"), Value::Bool(true));
        assert_eq!(guess_value_type("Lebanon"), Value::from("Lebanon"));
    }

    #[test]
    fn json_values_map_to_cells() {
        assert_eq!(json_to_value(&serde_json::json!(3)), Value::Integer(3));
        assert_eq!(json_to_value(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(json_to_value(&serde_json::json!(null)), Value::Null);
        assert_eq!(json_to_value(&serde_json::json!("x")), Value::from("x"));
    }

    #[test]
    fn cardinalities_count_distinct_cells() {
        let raw = RawTable {
            columns: vec!["a".into(), "b".into()],
            rows: vec![
                vec![Value::Integer(1), Value::from("x")],
                vec![Value::Integer(1), Value::from("y")],
            ],
        };
        let card = column_cardinalities(&raw);
        assert_eq!(card["a"], 1);
        assert_eq!(card["b"], 2);
    }
}
