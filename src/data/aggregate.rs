//! Group-and-reduce operations over a filtered [`RecordSet`].
//!
//! Every function here is pure. Empty input yields an empty table or a zero,
//! never an error; the only failures are [`SchemaError`]s for a field of the
//! wrong kind.
//!
//! Output ordering is part of each contract:
//! * frequency rankings are descending by count, ties in first-seen order
//! * grouped aggregates come out in first-seen order of their key
//! * time series are chronological (year, then month number)
//! * cross-tab rows and columns follow the frequency rank of their field

use std::collections::{HashMap, HashSet};

use chrono::Month;

use super::error::SchemaError;
use super::model::{Field, FieldKind, IncidentRecord, RecordSet, Value, month_from_number};

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Number of unique non-null values of `field`.
pub fn distinct_count(records: &RecordSet, field: Field) -> usize {
    records
        .iter()
        .map(|r| field.value(r))
        .filter(|v| !v.is_null())
        .collect::<HashSet<_>>()
        .len()
}

/// Sum of a numeric field, nulls contributing nothing.
///
/// Integer fields sum to [`Value::Integer`], float fields to [`Value::Float`].
pub fn sum(records: &RecordSet, field: Field) -> Result<Value, SchemaError> {
    let reducer = Reducer::Sum(field);
    reducer.validate()?;
    let mut acc = Accumulator::new(reducer);
    for rec in records.iter() {
        acc.push(rec);
    }
    Ok(acc.finish())
}

// ---------------------------------------------------------------------------
// Frequency rankings
// ---------------------------------------------------------------------------

/// Row counts of each non-null value of `field`, most frequent first.
/// Ties keep the order in which values first appear.
pub fn value_counts(records: &RecordSet, field: Field) -> Vec<(Value, usize)> {
    let mut order: Vec<(Value, usize)> = Vec::new();
    let mut index: HashMap<Value, usize> = HashMap::new();
    for rec in records.iter() {
        let v = field.value(rec);
        if v.is_null() {
            continue;
        }
        match index.get(&v) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(v.clone(), order.len());
                order.push((v, 1));
            }
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
}

/// The `k` most frequent values of `field` with their row counts.
pub fn top_k_by_frequency(records: &RecordSet, field: Field, k: usize) -> Vec<(Value, usize)> {
    let mut counts = value_counts(records, field);
    counts.truncate(k);
    counts
}

/// The `k` groups of `group_field` with the most distinct `distinct_field`
/// values, e.g. countries ranked by distinct violations rather than rows.
pub fn top_k_by_distinct(
    records: &RecordSet,
    group_field: Field,
    distinct_field: Field,
    k: usize,
) -> Vec<(Value, usize)> {
    let mut groups: Vec<(Value, HashSet<Value>)> = Vec::new();
    let mut index: HashMap<Value, usize> = HashMap::new();
    for rec in records.iter() {
        let key = group_field.value(rec);
        if key.is_null() {
            continue;
        }
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, HashSet::new()));
                groups.len() - 1
            }
        };
        let v = distinct_field.value(rec);
        if !v.is_null() {
            groups[slot].1.insert(v);
        }
    }
    let mut ranked: Vec<(Value, usize)> = groups
        .into_iter()
        .map(|(key, set)| (key, set.len()))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(k);
    ranked
}

// ---------------------------------------------------------------------------
// Reducers
// ---------------------------------------------------------------------------

/// How a group of rows collapses to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Number of rows.
    Rows,
    /// Sum of a numeric field, nulls ignored.
    Sum(Field),
    /// Number of distinct non-null values of a field.
    DistinctCount(Field),
    /// Arithmetic mean of a numeric field, nulls ignored.
    Mean(Field),
}

impl Reducer {
    fn validate(self) -> Result<(), SchemaError> {
        match self {
            Reducer::Sum(f) | Reducer::Mean(f) => f.require_numeric().map(|_| ()),
            Reducer::Rows | Reducer::DistinctCount(_) => Ok(()),
        }
    }

    /// Value of a group with no rows.
    pub fn empty_value(self) -> Value {
        match self {
            Reducer::Sum(f) if f.kind() == FieldKind::Float => Value::Float(0.0),
            Reducer::Mean(_) => Value::Float(0.0),
            _ => Value::Integer(0),
        }
    }
}

enum Accumulator {
    Rows(i64),
    IntSum(Field, i64),
    FloatSum(Field, f64),
    Distinct(Field, HashSet<Value>),
    Mean(Field, f64, usize),
}

impl Accumulator {
    fn new(reducer: Reducer) -> Self {
        match reducer {
            Reducer::Rows => Accumulator::Rows(0),
            Reducer::Sum(f) if f.kind() == FieldKind::Integer => Accumulator::IntSum(f, 0),
            Reducer::Sum(f) => Accumulator::FloatSum(f, 0.0),
            Reducer::DistinctCount(f) => Accumulator::Distinct(f, HashSet::new()),
            Reducer::Mean(f) => Accumulator::Mean(f, 0.0, 0),
        }
    }

    fn push(&mut self, rec: &IncidentRecord) {
        match self {
            Accumulator::Rows(n) => *n += 1,
            Accumulator::IntSum(f, total) => {
                if let Value::Integer(v) = f.value(rec) {
                    *total = total.saturating_add(v);
                }
            }
            Accumulator::FloatSum(f, total) => {
                if let Some(v) = f.number(rec) {
                    *total += v;
                }
            }
            Accumulator::Distinct(f, seen) => {
                let v = f.value(rec);
                if !v.is_null() {
                    seen.insert(v);
                }
            }
            Accumulator::Mean(f, total, n) => {
                if let Some(v) = f.number(rec) {
                    *total += v;
                    *n += 1;
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Rows(n) | Accumulator::IntSum(_, n) => Value::Integer(n),
            Accumulator::FloatSum(_, total) => Value::Float(total),
            Accumulator::Distinct(_, seen) => Value::Integer(seen.len() as i64),
            Accumulator::Mean(_, _, 0) => Value::Null,
            Accumulator::Mean(_, total, n) => Value::Float(total / n as f64),
        }
    }
}

// ---------------------------------------------------------------------------
// Grouped aggregate
// ---------------------------------------------------------------------------

/// One output row of [`grouped_aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRow {
    /// Key values, in the order of the requested key fields.
    pub keys: Vec<Value>,
    pub value: Value,
}

/// One row per key combination present in the data, in first-seen order.
/// Rows with a null in any key field are skipped.
pub fn grouped_aggregate(
    records: &RecordSet,
    keys: &[Field],
    reducer: Reducer,
) -> Result<Vec<GroupedRow>, SchemaError> {
    reducer.validate()?;
    let mut groups: Vec<(Vec<Value>, Accumulator)> = Vec::new();
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();

    for rec in records.iter() {
        let key: Vec<Value> = keys.iter().map(|f| f.value(rec)).collect();
        if key.iter().any(Value::is_null) {
            continue;
        }
        let slot = match index.get(&key) {
            Some(&i) => i,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, Accumulator::new(reducer)));
                groups.len() - 1
            }
        };
        groups[slot].1.push(rec);
    }

    Ok(groups
        .into_iter()
        .map(|(keys, acc)| GroupedRow {
            keys,
            value: acc.finish(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

/// Resolution of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Yearly,
    Monthly,
}

/// One chronological point of a (possibly per-series) time series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePoint {
    pub year: i32,
    /// `None` for yearly series.
    pub month: Option<Month>,
    /// Value of the series field, e.g. the country.
    pub series: Option<Value>,
    pub value: Value,
}

impl TimePoint {
    /// Display label of the period: `2020` or `2020-03-01`.
    pub fn period_label(&self) -> String {
        match self.month {
            Some(m) => format!("{}-{:02}-01", self.year, m.number_from_month()),
            None => self.year.to_string(),
        }
    }
}

/// Aggregate by year (and month) plus an optional series field, sorted by
/// the true chronological key even though month labels are strings.
/// Records without a date are skipped.
pub fn time_series(
    records: &RecordSet,
    granularity: Granularity,
    reducer: Reducer,
    series: Option<Field>,
) -> Result<Vec<TimePoint>, SchemaError> {
    let mut keys = vec![Field::Year];
    if granularity == Granularity::Monthly {
        keys.push(Field::MonthNum);
    }
    keys.extend(series);

    let mut points: Vec<TimePoint> = grouped_aggregate(records, &keys, reducer)?
        .into_iter()
        .filter_map(|row| {
            let mut it = row.keys.into_iter();
            let year = match it.next()? {
                Value::Integer(y) => i32::try_from(y).ok()?,
                _ => return None,
            };
            let month = match granularity {
                Granularity::Monthly => match it.next()? {
                    Value::Integer(m) => Some(month_from_number(u32::try_from(m).ok()?)?),
                    _ => return None,
                },
                Granularity::Yearly => None,
            };
            Some(TimePoint {
                year,
                month,
                series: it.next(),
                value: row.value,
            })
        })
        .collect();

    points.sort_by(|a, b| {
        (a.year, a.month.map(|m| m.number_from_month()), &a.series).cmp(&(
            b.year,
            b.month.map(|m| m.number_from_month()),
            &b.series,
        ))
    });
    Ok(points)
}

// ---------------------------------------------------------------------------
// Cross-tabulation
// ---------------------------------------------------------------------------

/// Parameters of a [`cross_tabulate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossTabSpec {
    pub row_field: Field,
    pub col_field: Field,
    pub reducer: Reducer,
    /// Keep the `row_limit` most frequent row values.
    pub row_limit: usize,
    /// Keep the most frequent column values; `None` keeps them all.
    pub col_limit: Option<usize>,
}

impl CrossTabSpec {
    /// Distinct violations per (row, column) pair.
    pub fn violations(row_field: Field, col_field: Field, row_limit: usize) -> Self {
        CrossTabSpec {
            row_field,
            col_field,
            reducer: Reducer::DistinctCount(Field::ViolationId),
            row_limit,
            col_limit: Some(row_limit),
        }
    }

    pub fn reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn col_limit(mut self, limit: Option<usize>) -> Self {
        self.col_limit = limit;
        self
    }
}

/// A dense matrix of aggregated values keyed by two categorical fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTable {
    pub row_field: Field,
    pub col_field: Field,
    /// Row labels, most frequent first.
    pub rows: Vec<Value>,
    /// Column labels, most frequent first.
    pub columns: Vec<Value>,
    /// `cells[r][c]`, zero-filled where no rows contributed.
    pub cells: Vec<Vec<Value>>,
}

impl CrossTable {
    pub fn get(&self, row: &Value, col: &Value) -> Option<&Value> {
        let r = self.rows.iter().position(|v| v == row)?;
        let c = self.columns.iter().position(|v| v == col)?;
        self.cells.get(r)?.get(c)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Sum of each row's cells.
    pub fn row_totals(&self) -> Vec<f64> {
        self.cells
            .iter()
            .map(|row| row.iter().filter_map(Value::as_f64).sum())
            .collect()
    }
}

/// Pivot `row_field` × `col_field` restricted to their top-K values.
///
/// Every top-K row and column is present even if all its cells are empty,
/// and missing combinations are zero rather than absent.
pub fn cross_tabulate(records: &RecordSet, spec: CrossTabSpec) -> Result<CrossTable, SchemaError> {
    spec.reducer.validate()?;

    let rows: Vec<Value> = top_k_by_frequency(records, spec.row_field, spec.row_limit)
        .into_iter()
        .map(|(v, _)| v)
        .collect();
    let columns: Vec<Value> = top_k_by_frequency(
        records,
        spec.col_field,
        spec.col_limit.unwrap_or(usize::MAX),
    )
    .into_iter()
    .map(|(v, _)| v)
    .collect();

    let row_index: HashMap<&Value, usize> = rows.iter().enumerate().map(|(i, v)| (v, i)).collect();
    let col_index: HashMap<&Value, usize> =
        columns.iter().enumerate().map(|(i, v)| (v, i)).collect();

    let mut accs: Vec<Vec<Option<Accumulator>>> = (0..rows.len())
        .map(|_| (0..columns.len()).map(|_| None).collect())
        .collect();

    for rec in records.iter() {
        let (Some(&r), Some(&c)) = (
            row_index.get(&spec.row_field.value(rec)),
            col_index.get(&spec.col_field.value(rec)),
        ) else {
            continue;
        };
        accs[r][c]
            .get_or_insert_with(|| Accumulator::new(spec.reducer))
            .push(rec);
    }

    let cells = accs
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|acc| match acc.map(Accumulator::finish) {
                    Some(Value::Null) | None => spec.reducer.empty_value(),
                    Some(v) => v,
                })
                .collect()
        })
        .collect();

    Ok(CrossTable {
        row_field: spec.row_field,
        col_field: spec.col_field,
        rows,
        columns,
        cells,
    })
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// Pairwise Pearson correlations over complete cases.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub fields: Vec<Field>,
    /// Rows with every field present.
    pub observations: usize,
    /// `values[i][j]`; empty when there are no complete rows. `None` where a
    /// field has zero variance off the diagonal.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, a: Field, b: Field) -> Option<f64> {
        let i = self.fields.iter().position(|f| *f == a)?;
        let j = self.fields.iter().position(|f| *f == b)?;
        self.values.get(i)?.get(j).copied().flatten()
    }
}

/// Pearson correlation matrix of numeric fields.
///
/// Rows with a null in any of the fields are dropped first (complete-case
/// deletion). The diagonal is exactly 1.0 and the matrix is symmetric.
pub fn correlation_matrix(
    records: &RecordSet,
    fields: &[Field],
) -> Result<CorrelationMatrix, SchemaError> {
    for f in fields {
        f.require_numeric()?;
    }

    let observations: Vec<Vec<f64>> = records
        .iter()
        .filter_map(|rec| fields.iter().map(|f| f.number(rec)).collect::<Option<Vec<f64>>>())
        .collect();
    let n = observations.len();
    if n == 0 {
        return Ok(CorrelationMatrix {
            fields: fields.to_vec(),
            observations: 0,
            values: Vec::new(),
        });
    }

    let k = fields.len();
    let means: Vec<f64> = (0..k)
        .map(|j| observations.iter().map(|row| row[j]).sum::<f64>() / n as f64)
        .collect();

    let mut values = vec![vec![None; k]; k];
    for i in 0..k {
        values[i][i] = Some(1.0);
        for j in (i + 1)..k {
            let (mut cov, mut var_i, mut var_j) = (0.0, 0.0, 0.0);
            for row in &observations {
                let di = row[i] - means[i];
                let dj = row[j] - means[j];
                cov += di * dj;
                var_i += di * di;
                var_j += dj * dj;
            }
            let r = if var_i > 0.0 && var_j > 0.0 {
                Some((cov / (var_i.sqrt() * var_j.sqrt())).clamp(-1.0, 1.0))
            } else {
                None
            };
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        fields: fields.to_vec(),
        observations: n,
        values,
    })
}
