use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Field as ArrowField, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

use skf_dashboard::data::aggregate::{
    CrossTabSpec, cross_tabulate, distinct_count, sum, top_k_by_frequency,
};
use skf_dashboard::data::error::{DataLoadError, SchemaError};
use skf_dashboard::data::export::{ExportOptions, export_csv};
use skf_dashboard::data::filter::{Selection, filter_records};
use skf_dashboard::data::loader::load_records;
use skf_dashboard::data::model::{Field, Value};
use skf_dashboard::data::topics::TopicLexicon;
use skf_dashboard::state::Dashboard;
use skf_dashboard::views::{Section, ViewOptions};

const HEADER: &str = "Violation_ID,Country,Date,Total_Victims,Gender,Violation_Nature,Attackers,Victim_Occupation,WB_VA,WB_PS,WB_GovE,WB_RQ,WB_RoL,WB_CoC,RSF_Score";

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn scenario_csv(dir: &TempDir) -> PathBuf {
    let body = [
        HEADER,
        "V1,A,2020-03-15,3,Male,Arrest,Police,Journalist,-1.0,-2.0,-1.5,-1.2,-1.1,-1.3,20.0",
        "V2,B,2021-07-01,2,Female,Threat,Unknown,Activist,0.5,-0.5,0.1,0.2,0.3,0.0,55.0",
        "V3,B,2021-08-20,4,Male,Arrest,Police,Journalist,0.6,-0.4,0.2,0.3,0.2,0.1,56.0",
    ]
    .join("\n");
    write_file(dir, "incidents.csv", &body)
}

#[test]
fn csv_load_filter_and_aggregate() {
    let dir = TempDir::new().unwrap();
    let records = load_records(&scenario_csv(&dir)).unwrap();
    assert_eq!(records.len(), 3);

    let only_a = filter_records(&records, &Selection::new().with_countries(["A"]));
    assert_eq!(distinct_count(&only_a, Field::ViolationId), 1);
    assert_eq!(sum(&only_a, Field::TotalVictims).unwrap(), Value::Integer(3));
    assert_eq!(distinct_count(&only_a, Field::Country), 1);

    let y2021 = filter_records(&records, &Selection::new().with_years([2021]));
    assert_eq!(y2021.len(), 2);
    assert_eq!(
        top_k_by_frequency(&records, Field::ViolationNature, 1),
        vec![(Value::from("Arrest"), 2)]
    );

    let xt = cross_tabulate(
        &records,
        CrossTabSpec::violations(Field::Country, Field::ViolationNature, 5),
    )
    .unwrap();
    assert_eq!(
        xt.get(&Value::from("A"), &Value::from("Threat")),
        Some(&Value::Integer(0))
    );
    assert_eq!(
        xt.get(&Value::from("B"), &Value::from("Arrest")),
        Some(&Value::Integer(1))
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_records(&dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, DataLoadError::Io { .. }), "{err}");
}

#[test]
fn missing_required_column_is_a_schema_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "short.csv", "Violation_ID,Country,Date\nV1,A,2020-01-01\n");
    match load_records(&path).unwrap_err() {
        DataLoadError::Schema(SchemaError::MissingColumn { column, .. }) => {
            assert_eq!(column, "Total_Victims");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "incidents.xlsx", "whatever");
    assert!(matches!(
        load_records(&path).unwrap_err(),
        DataLoadError::UnsupportedFormat(ext) if ext == "xlsx"
    ));
}

#[test]
fn json_records_load_like_csv() {
    let dir = TempDir::new().unwrap();
    let json = r#"[
        {"Violation_ID": "V1", "Country": "A", "Date": "2020-03-15", "Total_Victims": 3,
         "Gender": "Male", "Violation_Nature": "Arrest", "Attackers": "Police",
         "Victim_Occupation": "Journalist", "WB_VA": -1.0, "WB_PS": -2.0, "WB_GovE": -1.5,
         "WB_RQ": -1.2, "WB_RoL": -1.1, "WB_CoC": -1.3, "RSF_Score": 20.0, "Source": "hotline"},
        {"Violation_ID": "V2", "Country": "B", "Date": "not a date", "Total_Victims": null,
         "Gender": "Female", "Violation_Nature": "Threat", "Attackers": "Unknown",
         "Victim_Occupation": "Activist", "WB_VA": 0.5, "WB_PS": -0.5, "WB_GovE": 0.1,
         "WB_RQ": 0.2, "WB_RoL": 0.3, "WB_CoC": 0.0, "RSF_Score": 55.0}
    ]"#;
    let records = load_records(&write_file(&dir, "incidents.json", json)).unwrap();
    assert_eq!(records.len(), 2);

    let rows: Vec<_> = records.iter().collect();
    assert_eq!(rows[0].year(), Some(2020));
    assert_eq!(rows[0].month_name(), Some("March"));
    assert_eq!(rows[0].extra.get("Source"), Some(&Value::from("hotline")));
    assert_eq!(rows[1].date, None);
    assert_eq!(rows[1].total_victims, None);
}

fn write_parquet(path: &Path) {
    let text = |values: &[&str]| -> ArrayRef { Arc::new(StringArray::from(values.to_vec())) };
    let float = |v: f64| -> ArrayRef { Arc::new(Float64Array::from(vec![v, v + 1.0])) };
    let columns: Vec<(&str, ArrayRef)> = vec![
        ("Violation_ID", text(&["V1", "V2"])),
        ("Country", text(&["A", "B"])),
        ("Date", text(&["2020-03-15", "2021-07-01"])),
        ("Total_Victims", Arc::new(Int64Array::from(vec![3, 2]))),
        ("Gender", text(&["Male", "Female"])),
        ("Violation_Nature", text(&["Arrest", "Threat"])),
        ("Attackers", text(&["Police", "Unknown"])),
        ("Victim_Occupation", text(&["Journalist", "Activist"])),
        ("WB_VA", float(-1.0)),
        ("WB_PS", float(-2.0)),
        ("WB_GovE", float(-1.5)),
        ("WB_RQ", float(-1.2)),
        ("WB_RoL", float(-1.1)),
        ("WB_CoC", float(-1.3)),
        ("RSF_Score", float(20.0)),
    ];
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, col)| ArrowField::new(*name, col.data_type().clone(), true))
            .collect::<Vec<_>>(),
    ));
    let batch =
        RecordBatch::try_new(schema.clone(), columns.into_iter().map(|(_, c)| c).collect())
            .unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

#[test]
fn parquet_datasets_are_supported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("incidents.parquet");
    write_parquet(&path);

    let records = load_records(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(sum(&records, Field::TotalVictims).unwrap(), Value::Integer(5));
    let first = records.iter().next().unwrap();
    assert_eq!(first.governance.rsf_score, Some(20.0));
    assert_eq!(first.year(), Some(2020));
}

#[test]
fn topic_lexicon_from_csv() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "Topic_TopWords.csv",
        "Topic,Word,Weight\n0,غارة,0.09\n0,في,0.5\n4,مداهمة,0.03\n11,خارج,0.2\n",
    );
    let lexicon = TopicLexicon::load(&path).unwrap();
    assert_eq!(lexicon.len(), 2);
    assert_eq!(lexicon.labels(), vec!["Airstrikes / Military", "Home Raids / Arrests"]);
    let sizes: Vec<f64> = lexicon.words().iter().map(|w| w.font_size).collect();
    assert_eq!(sizes, vec![45.0, 18.0]);
}

#[test]
fn export_reloads_with_the_same_records() {
    let dir = TempDir::new().unwrap();
    let records = load_records(&scenario_csv(&dir)).unwrap();
    let subset = filter_records(&records, &Selection::new().with_countries(["B"]));

    let out = dir.path().join("export.csv");
    export_csv(&subset, &out, ExportOptions { include_helpers: true }).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("Violation_ID,Country,Date,Total_Victims"));
    assert!(header.ends_with("RSF_Score,Year,Month,Month_Num"));

    let reloaded = load_records(&out).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(sum(&reloaded, Field::TotalVictims).unwrap(), Value::Integer(6));
    assert_eq!(distinct_count(&reloaded, Field::Country), 1);
}

#[test]
fn dashboard_renders_sections_from_loaded_data() {
    let dir = TempDir::new().unwrap();
    let records = load_records(&scenario_csv(&dir)).unwrap();
    let dashboard = Dashboard::new(records, None);

    let selection = Selection::new().with_countries(["A"]);
    let tables = dashboard
        .render(Section::Overview, &selection, &ViewOptions::default())
        .unwrap();
    let metrics = &tables[0];
    let values: Vec<&Value> = metrics.column("Value").unwrap();
    assert_eq!(values[0], &Value::Integer(1));
    assert_eq!(values[1], &Value::Integer(3));
    assert_eq!(values[2], &Value::Integer(1));

    let json = serde_json::to_value(&tables).unwrap();
    assert_eq!(json[0]["title"], "Key Metrics");
}
