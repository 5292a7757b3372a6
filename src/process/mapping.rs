//! Projection of source CSV headers onto the canonical schema.
//!
//! Every canonical field names the source columns it may come from; the first
//! one present in the header wins. Source columns no field asks for are
//! dropped. Typing happens afterwards, field by field, in the record types.

use crate::error::MappingError;
use crate::process::RawTable;

/// One canonical field and its accepted source column names.
#[derive(Debug)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub sources: &'static [&'static str],
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(canonical: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            canonical,
            sources,
            required: true,
        }
    }

    pub const fn optional(canonical: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            canonical,
            sources,
            required: false,
        }
    }
}

/// The full rename map of one table kind.
#[derive(Debug)]
pub struct ColumnMap {
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

impl ColumnMap {
    /// Locate every canonical field in `headers`.
    pub fn resolve(&'static self, headers: &[String]) -> Result<Projection, MappingError> {
        let mut indices = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let idx = field
                .sources
                .iter()
                .find_map(|src| headers.iter().position(|h| h == src));
            if idx.is_none() && field.required {
                return Err(MappingError::MissingColumn {
                    table: self.table,
                    canonical: field.canonical,
                    candidates: field.sources,
                });
            }
            indices.push(idx);
        }
        Ok(Projection { map: self, indices })
    }
}

/// Resolved column positions for one concrete header.
#[derive(Debug)]
pub struct Projection {
    map: &'static ColumnMap,
    indices: Vec<Option<usize>>,
}

impl Projection {
    /// Optional canonical fields absent from the source header.
    pub fn gaps(&self) -> Vec<&'static str> {
        self.map
            .fields
            .iter()
            .zip(&self.indices)
            .filter(|(_, idx)| idx.is_none())
            .map(|(f, _)| f.canonical)
            .collect()
    }

    pub fn row<'a>(&'a self, cells: &'a [String]) -> MappedRow<'a> {
        MappedRow {
            projection: self,
            cells,
        }
    }
}

/// A raw row viewed through canonical names.
pub struct MappedRow<'a> {
    projection: &'a Projection,
    cells: &'a [String],
}

impl<'a> MappedRow<'a> {
    /// Raw string for `canonical`, `None` when the column is absent or the row is short.
    pub fn get(&self, canonical: &str) -> Option<&'a str> {
        let pos = self
            .projection
            .map
            .fields
            .iter()
            .position(|f| f.canonical == canonical)?;
        let idx = self.projection.indices[pos]?;
        self.cells.get(idx).map(String::as_str)
    }
}

/// A typed record built from a mapped row.
pub trait Canonical: Sized {
    const COLUMN_MAP: &'static ColumnMap;

    fn from_mapped(row: &MappedRow<'_>) -> Self;
}

/// Typed rows plus the optional fields the source lacked.
#[derive(Debug)]
pub struct MappedTable<R> {
    pub rows: Vec<R>,
    pub gaps: Vec<&'static str>,
}

/// Rename, type and stamp every row of `raw`. Empty tables stay empty.
pub fn map_table<R: Canonical>(raw: &RawTable) -> Result<MappedTable<R>, MappingError> {
    if raw.rows.is_empty() {
        return Ok(MappedTable {
            rows: Vec::new(),
            gaps: Vec::new(),
        });
    }
    let projection = R::COLUMN_MAP.resolve(&raw.headers)?;
    let rows = raw
        .rows
        .iter()
        .map(|cells| R::from_mapped(&projection.row(cells)))
        .collect();
    Ok(MappedTable {
        rows,
        gaps: projection.gaps(),
    })
}
