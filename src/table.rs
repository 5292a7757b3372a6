//! Type-erased tables handed to the output and warehouse sinks.
//!
//! The pipeline works on typed records; a [`Table`] is only built at the edge,
//! when a named collection is written to disk.

use chrono::NaiveDate;

use crate::process::normalize::Cnpj;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    Text,
    Date,
    Float,
    Int,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Text(Option<String>),
    Date(Option<NaiveDate>),
    Float(Option<f64>),
    Int(Option<i64>),
}

impl Cell {
    /// Rendering used by the CSV writer; missing values are empty fields.
    pub fn render(&self) -> String {
        match self {
            Cell::Text(v) => v.clone().unwrap_or_default(),
            Cell::Date(v) => v.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
            Cell::Float(v) => v.map(|f| f.to_string()).unwrap_or_default(),
            Cell::Int(v) => v.map(|i| i.to_string()).unwrap_or_default(),
        }
    }
}

impl From<&Option<Cnpj>> for Cell {
    fn from(v: &Option<Cnpj>) -> Self {
        Cell::Text(v.as_ref().map(|c| c.to_string()))
    }
}

impl From<&Option<String>> for Cell {
    fn from(v: &Option<String>) -> Self {
        Cell::Text(v.clone())
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(Some(v.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: CellKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: CellKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A row type with a fixed column layout.
pub trait Record {
    fn columns() -> Vec<Column>;
    fn cells(&self) -> Vec<Cell>;
}

/// A fact row carrying a fund identifier.
pub trait FundKeyed {
    fn cnpj(&self) -> Option<&Cnpj>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn from_records<R: Record>(records: &[R]) -> Self {
        Self {
            columns: R::columns(),
            rows: records.iter().map(Record::cells).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
