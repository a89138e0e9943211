use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use serde::Serialize;

use crate::data::model::Value;

// ---------------------------------------------------------------------------
// ResultTable – what the views hand to the presentation side
// ---------------------------------------------------------------------------

/// A small column-labelled table, ready to print or chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new<S: Into<String>>(title: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        ResultTable {
            title: title.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// All cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert to an Arrow batch. Column types are inferred from the cells:
    /// all-integer → Int64, numeric → Float64, boolean → Boolean, else Utf8.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        const NULL: &Value = &Value::Null;
        for (idx, name) in self.columns.iter().enumerate() {
            let cells: Vec<&Value> = self
                .rows
                .iter()
                .map(|r| r.get(idx).unwrap_or(NULL))
                .collect();
            let (data_type, array) = build_column(&cells);
            fields.push(ArrowField::new(name, data_type, true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        RecordBatch::try_new(schema, arrays)
            .with_context(|| format!("building record batch for '{}'", self.title))
    }

    /// Render as an ASCII grid.
    pub fn pretty(&self) -> Result<String> {
        let batch = self.to_record_batch()?;
        let grid = pretty_format_batches(&[batch]).context("formatting table")?;
        Ok(format!("{}\n{grid}", self.title))
    }
}

fn build_column(cells: &[&Value]) -> (DataType, ArrayRef) {
    let non_null = || cells.iter().filter(|v| !v.is_null());
    let has_values = non_null().next().is_some();

    if has_values && non_null().all(|v| matches!(v, Value::Integer(_))) {
        let mut b = Int64Builder::with_capacity(cells.len());
        for v in cells {
            match v {
                Value::Integer(i) => b.append_value(*i),
                _ => b.append_null(),
            }
        }
        return (DataType::Int64, Arc::new(b.finish()));
    }
    if has_values && non_null().all(|v| matches!(v, Value::Integer(_) | Value::Float(_))) {
        let mut b = Float64Builder::with_capacity(cells.len());
        for v in cells {
            b.append_option(v.as_f64());
        }
        return (DataType::Float64, Arc::new(b.finish()));
    }
    if has_values && non_null().all(|v| matches!(v, Value::Bool(_))) {
        let mut b = BooleanBuilder::with_capacity(cells.len());
        for v in cells {
            match v {
                Value::Bool(x) => b.append_value(*x),
                _ => b.append_null(),
            }
        }
        return (DataType::Boolean, Arc::new(b.finish()));
    }

    let mut b = StringBuilder::new();
    for v in cells {
        match v {
            Value::Null => b.append_null(),
            Value::Float(f) => b.append_value(f.to_string()),
            other => b.append_value(other.to_string()),
        }
    }
    (DataType::Utf8, Arc::new(b.finish()))
}
