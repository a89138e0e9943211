use std::io;
use std::path::Path;

use anyhow::{Context, Result};

use super::model::{Field, IncidentRecord, RecordSet, Value};

/// What to append after the source columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Also write the `Month_Num` sort helper.
    pub include_helpers: bool,
}

/// Column order of an export: the source columns, then the derived
/// calendar fields.
pub fn export_columns(records: &RecordSet, options: ExportOptions) -> Vec<String> {
    let mut columns: Vec<String> = records.columns().to_vec();
    columns.push(Field::Year.column_name().to_string());
    columns.push(Field::Month.column_name().to_string());
    if options.include_helpers {
        columns.push(Field::MonthNum.column_name().to_string());
    }
    columns
}

fn cell(record: &IncidentRecord, column: &str) -> Value {
    match column.parse::<Field>() {
        Ok(field) => field.value(record),
        Err(_) => record.extra.get(column).cloned().unwrap_or(Value::Null),
    }
}

/// Write the records as CSV with a header row.
pub fn write_csv<W: io::Write>(records: &RecordSet, writer: W, options: ExportOptions) -> Result<()> {
    let columns = export_columns(records, options);
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&columns).context("writing CSV header")?;
    for (row_no, rec) in records.iter().enumerate() {
        wtr.write_record(columns.iter().map(|c| cell(rec, c).to_field_string()))
            .with_context(|| format!("writing CSV row {row_no}"))?;
    }
    wtr.flush().context("flushing CSV output")?;
    Ok(())
}

/// The snapshot as UTF-8 bytes, ready to hand out as a download.
pub fn to_csv_bytes(records: &RecordSet, options: ExportOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf, options)?;
    Ok(buf)
}

/// Write the snapshot to a file.
pub fn export_csv(records: &RecordSet, path: &Path, options: ExportOptions) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv(records, io::BufWriter::new(file), options)?;
    log::info!("exported {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::data::model::CalendarDate;

    fn records() -> RecordSet {
        let columns = vec![
            "Violation_ID".to_string(),
            "Country".to_string(),
            "Date".to_string(),
            "Total_Victims".to_string(),
            "Notes".to_string(),
        ];
        let dated = IncidentRecord {
            violation_id: Some("V1".into()),
            country: Some("Syria".into()),
            date: Some(CalendarDate::new(NaiveDate::from_ymd_opt(2020, 4, 9).unwrap())),
            total_victims: Some(2),
            extra: BTreeMap::from([("Notes".to_string(), Value::from("a, b"))]),
            ..Default::default()
        };
        let undated = IncidentRecord {
            violation_id: Some("V2".into()),
            country: None,
            ..Default::default()
        };
        RecordSet::new(columns, vec![dated, undated])
    }

    #[test]
    fn writes_source_columns_then_calendar_fields() {
        let bytes = to_csv_bytes(&records(), ExportOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Violation_ID,Country,Date,Total_Victims,Notes,Year,Month");
        assert_eq!(lines[1], "V1,Syria,2020-04-09,2,\"a, b\",2020,April");
        assert_eq!(lines[2], "V2,,,,,,");
    }

    #[test]
    fn helper_column_is_opt_in() {
        let opts = ExportOptions { include_helpers: true };
        let cols = export_columns(&records(), opts);
        assert_eq!(cols.last().map(String::as_str), Some("Month_Num"));
        let text = String::from_utf8(to_csv_bytes(&records(), opts).unwrap()).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with(",2020,April,4"));
    }
}
