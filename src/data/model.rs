use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Month, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use super::error::{ParseWarning, SchemaError};

// ---------------------------------------------------------------------------
// Value – a single dynamically-typed cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring common Pandas dtypes.
/// Used as a grouping key downstream, so `Value` must be `Ord` and `Hash`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet / HashMap keys --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:.4}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, used by sums, means and correlations.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) if !v.is_nan() => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text view of a categorical cell. Numbers are rendered without a
    /// trailing `.0` so an id column read as numbers still groups sensibly.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(v) if v.is_finite() => Some(v.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }

    /// Rendering used for CSV export: nulls become empty fields and floats
    /// keep full precision.
    pub fn to_field_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Float(v) if v.is_nan() => String::new(),
            Value::Float(v) => v.to_string(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar fields derived from `Date`
// ---------------------------------------------------------------------------

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// English month names in calendar order.
pub fn month_names() -> impl Iterator<Item = &'static str> {
    MONTHS.iter().map(|m| m.name())
}

/// `1` → January … `12` → December.
pub fn month_from_number(n: u32) -> Option<Month> {
    MONTHS.get(n.checked_sub(1)? as usize).copied()
}

/// A parsed incident date together with the fields derived from it.
///
/// Holding all of them in one optional value keeps `Year`, `Month` and
/// `Month_Num` null exactly when `Date` is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDate {
    pub date: NaiveDate,
    pub year: i32,
    pub month: Month,
}

impl CalendarDate {
    pub fn new(date: NaiveDate) -> Self {
        CalendarDate {
            date,
            year: date.year(),
            month: MONTHS[date.month0() as usize],
        }
    }

    /// 1-based month number.
    pub fn month_num(&self) -> u32 {
        self.month.number_from_month()
    }

    pub fn month_name(&self) -> &'static str {
        self.month.name()
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Parse the loose date shapes found in the incident export.
/// Returns `None` instead of failing.
pub fn parse_incident_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

// ---------------------------------------------------------------------------
// Field – the fixed record schema
// ---------------------------------------------------------------------------

/// What kind of values a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Categorical,
    Integer,
    Float,
    Date,
}

/// Every column of an incident record the core knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    ViolationId,
    Country,
    Date,
    Year,
    Month,
    MonthNum,
    TotalVictims,
    Gender,
    ViolationNature,
    Attackers,
    VictimOccupation,
    WbVa,
    WbPs,
    WbGovE,
    WbRq,
    WbRoL,
    WbCoC,
    RsfScore,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::ViolationId,
        Field::Country,
        Field::Date,
        Field::Year,
        Field::Month,
        Field::MonthNum,
        Field::TotalVictims,
        Field::Gender,
        Field::ViolationNature,
        Field::Attackers,
        Field::VictimOccupation,
        Field::WbVa,
        Field::WbPs,
        Field::WbGovE,
        Field::WbRq,
        Field::WbRoL,
        Field::WbCoC,
        Field::RsfScore,
    ];

    /// The six World Bank governance indicators.
    pub const GOVERNANCE: [Field; 6] = [
        Field::WbVa,
        Field::WbPs,
        Field::WbGovE,
        Field::WbRq,
        Field::WbRoL,
        Field::WbCoC,
    ];

    /// Column name as it appears in the source file (case-sensitive).
    pub fn column_name(self) -> &'static str {
        match self {
            Field::ViolationId => "Violation_ID",
            Field::Country => "Country",
            Field::Date => "Date",
            Field::Year => "Year",
            Field::Month => "Month",
            Field::MonthNum => "Month_Num",
            Field::TotalVictims => "Total_Victims",
            Field::Gender => "Gender",
            Field::ViolationNature => "Violation_Nature",
            Field::Attackers => "Attackers",
            Field::VictimOccupation => "Victim_Occupation",
            Field::WbVa => "WB_VA",
            Field::WbPs => "WB_PS",
            Field::WbGovE => "WB_GovE",
            Field::WbRq => "WB_RQ",
            Field::WbRoL => "WB_RoL",
            Field::WbCoC => "WB_CoC",
            Field::RsfScore => "RSF_Score",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Date => FieldKind::Date,
            Field::Year | Field::MonthNum | Field::TotalVictims => FieldKind::Integer,
            Field::WbVa
            | Field::WbPs
            | Field::WbGovE
            | Field::WbRq
            | Field::WbRoL
            | Field::WbCoC
            | Field::RsfScore => FieldKind::Float,
            _ => FieldKind::Categorical,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self.kind(), FieldKind::Integer | FieldKind::Float)
    }

    /// Computed at load time from `Date` rather than read from the file.
    pub fn is_derived(self) -> bool {
        matches!(self, Field::Year | Field::Month | Field::MonthNum)
    }

    /// Fail with [`SchemaError::NotNumeric`] unless the field is numeric.
    pub fn require_numeric(self) -> Result<Self, SchemaError> {
        if self.is_numeric() {
            Ok(self)
        } else {
            Err(SchemaError::NotNumeric(self.column_name()))
        }
    }

    /// Read this field from a record.
    pub fn value(self, record: &IncidentRecord) -> Value {
        fn text(v: &Option<String>) -> Value {
            v.as_ref().map_or(Value::Null, |s| Value::Text(s.clone()))
        }
        fn float(v: Option<f64>) -> Value {
            v.map_or(Value::Null, Value::Float)
        }
        let g = &record.governance;
        match self {
            Field::ViolationId => text(&record.violation_id),
            Field::Country => text(&record.country),
            Field::Date => record.date.map_or(Value::Null, |d| Value::Date(d.date)),
            Field::Year => record
                .date
                .map_or(Value::Null, |d| Value::Integer(d.year as i64)),
            Field::Month => record
                .date
                .map_or(Value::Null, |d| Value::Text(d.month_name().to_string())),
            Field::MonthNum => record
                .date
                .map_or(Value::Null, |d| Value::Integer(d.month_num() as i64)),
            Field::TotalVictims => record
                .total_victims
                .map_or(Value::Null, |n| {
                    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
                }),
            Field::Gender => text(&record.gender),
            Field::ViolationNature => text(&record.violation_nature),
            Field::Attackers => text(&record.attackers),
            Field::VictimOccupation => text(&record.victim_occupation),
            Field::WbVa => float(g.wb_va),
            Field::WbPs => float(g.wb_ps),
            Field::WbGovE => float(g.wb_gov_e),
            Field::WbRq => float(g.wb_rq),
            Field::WbRoL => float(g.wb_rol),
            Field::WbCoC => float(g.wb_coc),
            Field::RsfScore => float(g.rsf_score),
        }
    }

    /// Numeric view without allocating, for hot numeric loops.
    pub fn number(self, record: &IncidentRecord) -> Option<f64> {
        let g = &record.governance;
        match self {
            Field::Year => record.date.map(|d| d.year as f64),
            Field::MonthNum => record.date.map(|d| d.month_num() as f64),
            Field::TotalVictims => record.total_victims.map(|n| n as f64),
            Field::WbVa => g.wb_va,
            Field::WbPs => g.wb_ps,
            Field::WbGovE => g.wb_gov_e,
            Field::WbRq => g.wb_rq,
            Field::WbRoL => g.wb_rol,
            Field::WbCoC => g.wb_coc,
            Field::RsfScore => g.rsf_score,
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Field {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.column_name() == s)
            .ok_or_else(|| SchemaError::UnknownColumn(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// IncidentRecord – one row of the dataset
// ---------------------------------------------------------------------------

/// Country-level governance scores attached to each row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GovernanceScores {
    pub wb_va: Option<f64>,
    pub wb_ps: Option<f64>,
    pub wb_gov_e: Option<f64>,
    pub wb_rq: Option<f64>,
    pub wb_rol: Option<f64>,
    pub wb_coc: Option<f64>,
    pub rsf_score: Option<f64>,
}

/// A single reported incident (one victim row).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentRecord {
    pub violation_id: Option<String>,
    pub country: Option<String>,
    /// `None` when the source date did not parse.
    pub date: Option<CalendarDate>,
    pub total_victims: Option<u64>,
    pub gender: Option<String>,
    pub violation_nature: Option<String>,
    pub attackers: Option<String>,
    pub victim_occupation: Option<String>,
    pub governance: GovernanceScores,
    /// Source columns outside the fixed schema, carried through for export.
    pub extra: BTreeMap<String, Value>,
}

impl IncidentRecord {
    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year)
    }

    pub fn month_name(&self) -> Option<&'static str> {
        self.date.map(|d| d.month_name())
    }
}

// ---------------------------------------------------------------------------
// RecordSet – an immutable collection of incident records
// ---------------------------------------------------------------------------

/// Loaded or filtered records. Rows are shared, so subsets are cheap.
#[derive(Debug, Clone)]
pub struct RecordSet {
    /// Source column names in file order, derived calendar columns excluded.
    columns: Arc<[String]>,
    records: Vec<Arc<IncidentRecord>>,
}

impl RecordSet {
    pub fn new(columns: Vec<String>, records: Vec<IncidentRecord>) -> Self {
        RecordSet {
            columns: columns.into(),
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// Records built in code, with the fixed schema as column list.
    pub fn from_records(records: Vec<IncidentRecord>) -> Self {
        let columns = Field::ALL
            .iter()
            .filter(|f| !f.is_derived())
            .map(|f| f.column_name().to_string())
            .collect();
        Self::new(columns, records)
    }

    /// Build typed records from a raw table, checking the schema first.
    ///
    /// Returns the records and the cell-level warnings that were recovered
    /// by nulling the offending value.
    pub fn from_raw(
        raw: RawTable,
        source_name: &str,
    ) -> Result<(Self, Vec<ParseWarning>), SchemaError> {
        let index_of = |field: Field| -> Result<usize, SchemaError> {
            raw.columns
                .iter()
                .position(|c| c == field.column_name())
                .ok_or_else(|| SchemaError::MissingColumn {
                    column: field.column_name().to_string(),
                    source_name: source_name.to_string(),
                })
        };

        let mut indices: BTreeMap<Field, usize> = BTreeMap::new();
        for field in Field::ALL.iter().copied().filter(|f| !f.is_derived()) {
            indices.insert(field, index_of(field)?);
        }

        let derived_names: BTreeSet<&str> = Field::ALL
            .iter()
            .filter(|f| f.is_derived())
            .map(|f| f.column_name())
            .collect();
        let extra_cols: Vec<(usize, &String)> = raw
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                !derived_names.contains(c.as_str()) && c.parse::<Field>().is_err()
            })
            .collect();

        let mut warnings = Vec::new();
        let mut records = Vec::with_capacity(raw.rows.len());

        for (row_no, row) in raw.rows.iter().enumerate() {
            let cell = |field: Field| cell_at(row, &indices, field);
            let text = |field: Field| cell(field).as_text();

            let mut float = |field: Field| float_cell(cell(field), field, row_no, &mut warnings);
            let governance = GovernanceScores {
                wb_va: float(Field::WbVa),
                wb_ps: float(Field::WbPs),
                wb_gov_e: float(Field::WbGovE),
                wb_rq: float(Field::WbRq),
                wb_rol: float(Field::WbRoL),
                wb_coc: float(Field::WbCoC),
                rsf_score: float(Field::RsfScore),
            };

            let date = match cell(Field::Date) {
                Value::Null => None,
                Value::Date(d) => Some(CalendarDate::new(*d)),
                other => {
                    let raw_date = other.as_text().unwrap_or_default();
                    let parsed = parse_incident_date(&raw_date).map(CalendarDate::new);
                    if parsed.is_none() {
                        warnings.push(ParseWarning {
                            row: row_no,
                            column: Field::Date.column_name(),
                            raw: raw_date,
                        });
                    }
                    parsed
                }
            };

            let victims_cell = cell(Field::TotalVictims);
            let total_victims = parse_victim_count(victims_cell);
            if total_victims.is_none() && !victims_cell.is_null() {
                warnings.push(ParseWarning {
                    row: row_no,
                    column: Field::TotalVictims.column_name(),
                    raw: victims_cell.to_field_string(),
                });
            }

            let extra = extra_cols
                .iter()
                .map(|&(i, name)| (name.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                .collect();

            records.push(IncidentRecord {
                violation_id: text(Field::ViolationId),
                country: text(Field::Country),
                date,
                total_victims,
                gender: text(Field::Gender),
                violation_nature: text(Field::ViolationNature),
                attackers: text(Field::Attackers),
                victim_occupation: text(Field::VictimOccupation),
                governance,
                extra,
            });
        }

        let columns = raw
            .columns
            .into_iter()
            .filter(|c| !derived_names.contains(c.as_str()))
            .collect();

        Ok((Self::new(columns, records), warnings))
    }

    /// Source column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncidentRecord> {
        self.records.iter().map(|r| r.as_ref())
    }

    /// Keep only the rows matching `keep`, sharing row storage with `self`.
    pub fn subset<F>(&self, mut keep: F) -> RecordSet
    where
        F: FnMut(&IncidentRecord) -> bool,
    {
        RecordSet {
            columns: Arc::clone(&self.columns),
            records: self
                .records
                .iter()
                .filter(|r| keep(r))
                .cloned()
                .collect(),
        }
    }

    /// Sorted set of distinct non-null values of a field.
    pub fn unique_values(&self, field: Field) -> BTreeSet<Value> {
        self.iter()
            .map(|r| field.value(r))
            .filter(|v| !v.is_null())
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn cell_at<'a>(row: &'a [Value], indices: &BTreeMap<Field, usize>, field: Field) -> &'a Value {
    const NULL: &Value = &Value::Null;
    indices
        .get(&field)
        .and_then(|&i| row.get(i))
        .unwrap_or(NULL)
}

fn float_cell(
    v: &Value,
    field: Field,
    row: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Option<f64> {
    match v {
        Value::Null => None,
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(f) if !f.is_nan() => Some(f),
            _ => {
                warnings.push(ParseWarning {
                    row,
                    column: field.column_name(),
                    raw: s.clone(),
                });
                None
            }
        },
        other => {
            let number = other.as_f64();
            if number.is_none() {
                warnings.push(ParseWarning {
                    row,
                    column: field.column_name(),
                    raw: other.to_field_string(),
                });
            }
            number
        }
    }
}

/// Largest accepted victim count; anything above cannot be summed as `i64`.
const MAX_VICTIMS: u64 = i64::MAX as u64;

fn parse_victim_count(v: &Value) -> Option<u64> {
    // i64::MAX rounds up to 2^63 as f64, so the float bound is strict.
    let whole = |f: f64| f >= 0.0 && f.fract() == 0.0 && f < i64::MAX as f64;
    match v {
        Value::Integer(i) => u64::try_from(*i).ok(),
        Value::Float(f) if whole(*f) => Some(*f as u64),
        Value::Text(s) => {
            let s = s.trim();
            match s.parse::<u64>() {
                Ok(n) => Some(n).filter(|n| *n <= MAX_VICTIMS),
                Err(_) => s.parse::<f64>().ok().filter(|f| whole(*f)).map(|f| f as u64),
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RawTable – untyped loader output
// ---------------------------------------------------------------------------

/// A header plus rows of cells, straight from a loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}
