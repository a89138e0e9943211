use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use crate::data::aggregate::{
    CorrelationMatrix, CrossTabSpec, CrossTable, Granularity, Reducer, correlation_matrix,
    cross_tabulate, distinct_count, grouped_aggregate, sum, time_series, top_k_by_frequency,
    value_counts,
};
use crate::data::export::{ExportOptions, export_columns};
use crate::data::filter::Selection;
use crate::data::model::{Field, RecordSet, Value};
use crate::data::topics::TopicLexicon;
use crate::table::ResultTable;

// ---------------------------------------------------------------------------
// View selectors
// ---------------------------------------------------------------------------

/// Dashboard sections, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    Overview,
    Trends,
    ViolationPatterns,
    CrossAnalysis,
    Governance,
    Topics,
    RawData,
}

/// What the trend lines count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrendMetric {
    /// Distinct `Violation_ID`s.
    Violations,
    /// Sum of `Total_Victims`.
    Victims,
}

impl TrendMetric {
    fn reducer(self) -> Reducer {
        match self {
            TrendMetric::Violations => Reducer::DistinctCount(Field::ViolationId),
            TrendMetric::Victims => Reducer::Sum(Field::TotalVictims),
        }
    }

    fn label(self) -> &'static str {
        match self {
            TrendMetric::Violations => "Total Violations",
            TrendMetric::Victims => "Total Victims",
        }
    }
}

/// Time resolution of the trend view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrendGranularity {
    Yearly,
    Monthly,
}

impl From<TrendGranularity> for Granularity {
    fn from(g: TrendGranularity) -> Self {
        match g {
            TrendGranularity::Yearly => Granularity::Yearly,
            TrendGranularity::Monthly => Granularity::Monthly,
        }
    }
}

/// Per-request options that only some sections read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub metric: TrendMetric,
    pub granularity: TrendGranularity,
    /// Topic label to show; `None` shows every topic.
    pub topic: Option<String>,
    pub export: ExportOptions,
}

impl Default for ViewOptions {
    fn default() -> Self {
        ViewOptions {
            metric: TrendMetric::Violations,
            granularity: TrendGranularity::Yearly,
            topic: None,
            export: ExportOptions::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

/// Headline numbers of the overview section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverviewMetrics {
    /// Distinct `Violation_ID`s.
    pub reported_violations: usize,
    pub total_victims: i64,
    pub countries_covered: usize,
}

pub fn overview_metrics(records: &RecordSet) -> Result<OverviewMetrics> {
    let total_victims = match sum(records, Field::TotalVictims)? {
        Value::Integer(n) => n,
        other => other.as_f64().unwrap_or(0.0) as i64,
    };
    Ok(OverviewMetrics {
        reported_violations: distinct_count(records, Field::ViolationId),
        total_victims,
        countries_covered: distinct_count(records, Field::Country),
    })
}

fn counts_table(title: &str, label: &str, counts: Vec<(Value, usize)>) -> ResultTable {
    let mut table = ResultTable::new(title, [label, "Count"]);
    for (value, count) in counts {
        table.push_row(vec![value, Value::Integer(count as i64)]);
    }
    table
}

pub fn overview(records: &RecordSet) -> Result<Vec<ResultTable>> {
    let m = overview_metrics(records)?;
    let mut metrics = ResultTable::new("Key Metrics", ["Metric", "Value"]);
    metrics.push_row(vec![
        Value::from("Reported Violations"),
        Value::Integer(m.reported_violations as i64),
    ]);
    metrics.push_row(vec![Value::from("Total Victims"), Value::Integer(m.total_victims)]);
    metrics.push_row(vec![
        Value::from("Countries Covered"),
        Value::Integer(m.countries_covered as i64),
    ]);

    Ok(vec![
        metrics,
        counts_table(
            "Gender Distribution of Victims",
            "Gender",
            value_counts(records, Field::Gender),
        ),
        counts_table(
            "Top 5 Violation Types",
            "Violation Type",
            top_k_by_frequency(records, Field::ViolationNature, 5),
        ),
        counts_table(
            "Top 5 Affected Countries",
            "Country",
            top_k_by_frequency(records, Field::Country, 5),
        ),
        counts_table(
            "Top 5 Attacker Groups",
            "Attacker",
            top_k_by_frequency(records, Field::Attackers, 5),
        ),
    ])
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Per-country trend lines, chronologically ordered.
pub fn trends(
    records: &RecordSet,
    metric: TrendMetric,
    granularity: TrendGranularity,
) -> Result<ResultTable> {
    let points = time_series(
        records,
        granularity.into(),
        metric.reducer(),
        Some(Field::Country),
    )?;
    let (title_unit, period) = match granularity {
        TrendGranularity::Yearly => ("Yearly", "Year"),
        TrendGranularity::Monthly => ("Monthly", "Month_Year"),
    };
    let mut table = ResultTable::new(
        format!("{title_unit} {} by Country", metric.label()),
        [period, "Country", metric.label()],
    );
    for p in points {
        let period_cell = match granularity {
            TrendGranularity::Yearly => Value::Integer(p.year as i64),
            TrendGranularity::Monthly => Value::Text(p.period_label()),
        };
        table.push_row(vec![period_cell, p.series.unwrap_or(Value::Null), p.value]);
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Violation patterns and cross analysis
// ---------------------------------------------------------------------------

/// Long-form `(row, column, value)` table of a cross-tab, row-major in rank
/// order. Suits stacked bar charts.
fn cross_table_long(title: &str, xt: &CrossTable, value_label: &str) -> ResultTable {
    let mut table = ResultTable::new(
        title,
        [xt.row_field.column_name(), xt.col_field.column_name(), value_label],
    );
    for (r, row_value) in xt.rows.iter().enumerate() {
        for (c, col_value) in xt.columns.iter().enumerate() {
            table.push_row(vec![
                row_value.clone(),
                col_value.clone(),
                xt.cells[r][c].clone(),
            ]);
        }
    }
    table
}

/// Wide matrix form of a cross-tab: first column holds the row labels.
fn cross_table_wide(title: &str, xt: &CrossTable) -> ResultTable {
    let mut columns = vec![xt.row_field.column_name().to_string()];
    columns.extend(xt.columns.iter().map(|c| c.to_string()));
    let mut table = ResultTable::new(title, columns);
    for (r, row_value) in xt.rows.iter().enumerate() {
        let mut row = vec![row_value.clone()];
        row.extend(xt.cells[r].iter().cloned());
        table.push_row(row);
    }
    table
}

pub fn violation_patterns(records: &RecordSet) -> Result<Vec<ResultTable>> {
    let top_types: Vec<Value> = top_k_by_frequency(records, Field::ViolationNature, 5)
        .into_iter()
        .map(|(v, _)| v)
        .collect();
    let top_only = records.subset(|r| top_types.contains(&Field::ViolationNature.value(r)));
    let mut over_time = grouped_aggregate(
        &top_only,
        &[Field::Year, Field::ViolationNature],
        Reducer::DistinctCount(Field::ViolationId),
    )?;
    over_time.sort_by(|a, b| {
        let rank = |v: &Value| top_types.iter().position(|t| t == v);
        (&a.keys[0], rank(&a.keys[1])).cmp(&(&b.keys[0], rank(&b.keys[1])))
    });
    let mut over_time_table =
        ResultTable::new("Top 5 Violation Types Over Time", ["Year", "Violation_Nature", "Count"]);
    for row in over_time {
        let mut cells = row.keys;
        cells.push(row.value);
        over_time_table.push_row(cells);
    }

    let by_attacker = cross_tabulate(
        records,
        CrossTabSpec::violations(Field::ViolationNature, Field::Attackers, 6).reducer(Reducer::Rows),
    )?;
    let by_occupation = cross_tabulate(
        records,
        CrossTabSpec::violations(Field::ViolationNature, Field::VictimOccupation, 10)
            .reducer(Reducer::Rows),
    )?;

    Ok(vec![
        over_time_table,
        cross_table_long("Top Violation Types by Attacker Group", &by_attacker, "Count"),
        cross_table_long(
            "Top Violation Types by Victim Occupation",
            &by_occupation,
            "Count",
        ),
    ])
}

pub fn cross_analysis(records: &RecordSet) -> Result<Vec<ResultTable>> {
    let specs = [
        (
            "Top Violation Types by Country",
            CrossTabSpec::violations(Field::ViolationNature, Field::Country, 10),
        ),
        (
            "Attacker Groups by Victim Occupation",
            CrossTabSpec::violations(Field::Attackers, Field::VictimOccupation, 10),
        ),
        (
            "Violation Types by Gender",
            CrossTabSpec::violations(Field::ViolationNature, Field::Gender, 10).col_limit(None),
        ),
        (
            "Attackers by Gender",
            CrossTabSpec::violations(Field::Attackers, Field::Gender, 10).col_limit(None),
        ),
    ];
    specs
        .into_iter()
        .map(|(title, spec)| -> Result<ResultTable> {
            Ok(cross_table_wide(title, &cross_tabulate(records, spec)?))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

/// Readable name of a governance indicator.
pub fn indicator_label(field: Field) -> &'static str {
    match field {
        Field::WbVa => "Voice and Accountability",
        Field::WbPs => "Political Stability & Absence of Violence",
        Field::WbGovE => "Government Effectiveness",
        Field::WbRq => "Regulatory Quality",
        Field::WbRoL => "Rule of Law",
        Field::WbCoC => "Control of Corruption",
        Field::RsfScore => "RSF Freedom Score",
        other => other.column_name(),
    }
}

/// Two-decimal rounding, halves to even.
fn round2(v: Value) -> Value {
    match v {
        Value::Float(f) => Value::Float((f * 100.0).round_ties_even() / 100.0),
        other => other,
    }
}

/// Per-country mean of each World Bank indicator, rounded to 2 decimals.
/// Countries come out in name order.
pub fn governance_scores(records: &RecordSet) -> Result<ResultTable> {
    let mut columns = vec!["Country"];
    columns.extend(Field::GOVERNANCE.iter().map(|f| f.column_name()));
    let mut table = ResultTable::new("World Bank Scores by Country", columns);

    let countries: Vec<Value> = records.unique_values(Field::Country).into_iter().collect();
    let mut per_indicator = Vec::with_capacity(Field::GOVERNANCE.len());
    for field in Field::GOVERNANCE {
        per_indicator.push(grouped_aggregate(records, &[Field::Country], Reducer::Mean(field))?);
    }

    for country in countries {
        let mut row = vec![country.clone()];
        for groups in &per_indicator {
            let mean = groups
                .iter()
                .find(|g| g.keys[0] == country)
                .map_or(Value::Null, |g| round2(g.value.clone()));
            row.push(mean);
        }
        table.push_row(row);
    }
    Ok(table)
}

/// Fields of the governance correlation matrix.
pub const CORRELATION_FIELDS: [Field; 7] = [
    Field::RsfScore,
    Field::WbVa,
    Field::WbPs,
    Field::WbGovE,
    Field::WbRq,
    Field::WbRoL,
    Field::WbCoC,
];

fn correlation_table(m: &CorrelationMatrix) -> ResultTable {
    let mut columns = vec!["Indicator".to_string()];
    columns.extend(m.fields.iter().map(|f| indicator_label(*f).to_string()));
    let mut table = ResultTable::new(
        format!(
            "Correlation Matrix – RSF and Governance Scores (n = {})",
            m.observations
        ),
        columns,
    );
    for (i, field) in m.fields.iter().enumerate() {
        let Some(values) = m.values.get(i) else {
            break;
        };
        let mut row = vec![Value::from(indicator_label(*field))];
        row.extend(
            values
                .iter()
                .map(|v| v.map_or(Value::Null, Value::Float)),
        );
        table.push_row(row);
    }
    table
}

pub fn governance(records: &RecordSet) -> Result<Vec<ResultTable>> {
    Ok(vec![
        governance_scores(records)?,
        correlation_table(&correlation_matrix(records, &CORRELATION_FIELDS)?),
    ])
}

// ---------------------------------------------------------------------------
// Topics and raw data
// ---------------------------------------------------------------------------

pub fn topics(lexicon: &TopicLexicon, label: Option<&str>) -> ResultTable {
    let title = match label {
        Some(l) => format!("Topic Lexicon – {l}"),
        None => "Topic Lexicon – All".to_string(),
    };
    let mut table = ResultTable::new(title, ["Topic", "Label", "Word", "Weight", "FontSize"]);
    for w in lexicon.select(label) {
        table.push_row(vec![
            Value::Integer(w.topic),
            Value::from(w.label),
            Value::Text(w.word.clone()),
            Value::Float(w.weight),
            Value::Float(w.font_size),
        ]);
    }
    table
}

/// The filtered records with the export column layout.
pub fn raw_data(records: &RecordSet, options: ExportOptions) -> ResultTable {
    let columns = export_columns(records, options);
    let fields: Vec<Option<Field>> = columns.iter().map(|c| c.parse().ok()).collect();
    let mut table = ResultTable::new(
        format!("Raw Data ({} records)", records.len()),
        columns.clone(),
    );
    for rec in records.iter() {
        table.push_row(
            columns
                .iter()
                .zip(&fields)
                .map(|(name, field)| match field {
                    Some(f) => f.value(rec),
                    None => rec.extra.get(name).cloned().unwrap_or(Value::Null),
                })
                .collect(),
        );
    }
    table
}

/// Human-readable description of the active filters.
pub fn describe_selection(selection: &Selection) -> String {
    fn part<T: ToString>(name: &str, values: impl Iterator<Item = T>) -> Option<String> {
        let v: Vec<String> = values.map(|x| x.to_string()).collect();
        (!v.is_empty()).then(|| format!("{name}: {}", v.join(", ")))
    }
    let parts: Vec<String> = [
        part("Country", selection.countries.iter()),
        part("Year", selection.years.iter()),
        part("Month", selection.months.iter()),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        "all records".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::data::model::{CalendarDate, GovernanceScores, IncidentRecord};

    fn rec(id: &str, country: &str, ymd: (i32, u32, u32), victims: u64, va: f64) -> IncidentRecord {
        IncidentRecord {
            violation_id: Some(id.into()),
            country: Some(country.into()),
            date: Some(CalendarDate::new(
                NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap(),
            )),
            total_victims: Some(victims),
            gender: Some("Male".into()),
            violation_nature: Some("Arrest".into()),
            attackers: Some("Police".into()),
            victim_occupation: Some("Journalist".into()),
            governance: GovernanceScores {
                wb_va: Some(va),
                wb_ps: Some(va * 2.0),
                wb_gov_e: Some(-va),
                wb_rq: Some(1.0 + va),
                wb_rol: Some(va * va),
                wb_coc: Some(0.5 * va),
                rsf_score: Some(80.0 - va * 10.0),
            },
            extra: BTreeMap::new(),
        }
    }

    fn sample() -> RecordSet {
        RecordSet::from_records(vec![
            rec("V1", "Syria", (2020, 3, 1), 2, 0.111),
            rec("V1", "Syria", (2020, 3, 1), 1, 0.333),
            rec("V2", "Lebanon", (2021, 1, 5), 5, 1.0),
        ])
    }

    #[test]
    fn overview_metrics_match_scenario() {
        let m = overview_metrics(&sample()).unwrap();
        assert_eq!(
            m,
            OverviewMetrics {
                reported_violations: 2,
                total_victims: 8,
                countries_covered: 2
            }
        );
        let tables = overview(&sample()).unwrap();
        assert_eq!(tables.len(), 5);
        assert_eq!(tables[3].rows[0], vec![Value::from("Syria"), Value::Integer(2)]);
    }

    #[test]
    fn monthly_trend_labels_periods() {
        let t = trends(&sample(), TrendMetric::Victims, TrendGranularity::Monthly).unwrap();
        assert_eq!(t.columns, vec!["Month_Year", "Country", "Total Victims"]);
        assert_eq!(
            t.rows[0],
            vec![Value::from("2020-03-01"), Value::from("Syria"), Value::Integer(3)]
        );
        assert_eq!(t.rows[1][0], Value::from("2021-01-01"));
    }

    #[test]
    fn governance_means_are_rounded_per_country() {
        let t = governance_scores(&sample()).unwrap();
        assert_eq!(t.rows[0][0], Value::from("Lebanon"));
        assert_eq!(t.rows[1][0], Value::from("Syria"));
        // (0.111 + 0.333) / 2 = 0.222
        assert_eq!(t.rows[1][1], Value::Float(0.22));
    }

    #[test]
    fn correlation_table_has_labelled_square_shape() {
        let tables = governance(&sample()).unwrap();
        let corr = &tables[1];
        assert_eq!(corr.columns.len(), CORRELATION_FIELDS.len() + 1);
        assert_eq!(corr.rows.len(), CORRELATION_FIELDS.len());
        assert_eq!(corr.rows[0][0], Value::from("RSF Freedom Score"));
        assert_eq!(corr.rows[2][3], Value::Float(1.0));
    }

    #[test]
    fn correlation_cells_keep_full_precision() {
        let records = sample();
        let m = correlation_matrix(&records, &CORRELATION_FIELDS).unwrap();
        let corr = correlation_table(&m);
        // WB_VA against WB_RoL (= WB_VA squared) is not a round number.
        let expected = m.get(Field::WbVa, Field::WbRoL).unwrap();
        assert_ne!(expected, (expected * 100.0).round() / 100.0);
        assert_eq!(corr.rows[1][6], Value::Float(expected));
    }

    #[test]
    fn rounding_sends_halves_to_even() {
        assert_eq!(round2(Value::Float(0.125)), Value::Float(0.12));
        assert_eq!(round2(Value::Float(0.375)), Value::Float(0.38));
        assert_eq!(round2(Value::Integer(3)), Value::Integer(3));
    }

    #[test]
    fn cross_analysis_tables_keep_rank_order() {
        let tables = cross_analysis(&sample()).unwrap();
        assert_eq!(tables.len(), 4);
        let by_country = &tables[0];
        assert_eq!(by_country.columns, vec!["Violation_Nature", "Syria", "Lebanon"]);
        assert_eq!(
            by_country.rows[0],
            vec![Value::from("Arrest"), Value::Integer(1), Value::Integer(1)]
        );
    }

    #[test]
    fn patterns_count_rows_for_stacked_bars() {
        let tables = violation_patterns(&sample()).unwrap();
        assert_eq!(
            tables[0].rows,
            vec![
                vec![Value::Integer(2020), Value::from("Arrest"), Value::Integer(1)],
                vec![Value::Integer(2021), Value::from("Arrest"), Value::Integer(1)],
            ]
        );
        assert_eq!(
            tables[1].rows[0],
            vec![Value::from("Arrest"), Value::from("Police"), Value::Integer(3)]
        );
    }

    #[test]
    fn raw_data_uses_export_layout() {
        let t = raw_data(&sample(), ExportOptions::default());
        assert_eq!(t.len(), 3);
        assert_eq!(t.columns.last().map(String::as_str), Some("Month"));
        assert_eq!(t.column("Month").unwrap()[2], &Value::from("January"));
    }

    #[test]
    fn selection_description() {
        assert_eq!(describe_selection(&Selection::new()), "all records");
        let sel = Selection::new().with_countries(["Syria"]).with_years([2020, 2021]);
        assert_eq!(describe_selection(&sel), "Country: Syria; Year: 2020, 2021");
    }
}
