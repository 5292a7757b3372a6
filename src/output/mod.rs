// src/output/mod.rs
use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use parquet::{
    arrow::ArrowWriter,
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::info;

use crate::table::{Cell, CellKind, Table};

/// JSON payload consumed by the static frontend
pub mod frontend;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            other => bail!("unknown output format {:?} (expected csv or parquet)", other),
        }
    }
}

/// Comma-delimited with a header row; missing values are empty fields.
#[tracing::instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn write_table_csv(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("creating output directory")?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating file {}", path.display()))?;
    wtr.write_record(table.column_names())
        .context("writing CSV header")?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(Cell::render))
            .context("writing CSV row")?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

fn arrow_schema(table: &Table) -> Schema {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| {
            let dt = match c.kind {
                CellKind::Text => DataType::Utf8,
                CellKind::Date => DataType::Date32,
                CellKind::Float => DataType::Float64,
                CellKind::Int => DataType::Int64,
            };
            Field::new(&c.name, dt, true)
        })
        .collect();
    Schema::new(fields)
}

fn days_since_epoch(d: NaiveDate) -> Option<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    i32::try_from((d - epoch).num_days()).ok()
}

/// Build one Arrow column; a cell of the wrong kind becomes null.
fn arrow_column(table: &Table, idx: usize, kind: CellKind) -> ArrayRef {
    let cells = table.rows.iter().map(|r| r.get(idx));
    match kind {
        CellKind::Text => Arc::new(StringArray::from(
            cells
                .map(|c| match c {
                    Some(Cell::Text(v)) => v.clone(),
                    _ => None,
                })
                .collect::<Vec<Option<String>>>(),
        )),
        CellKind::Date => Arc::new(Date32Array::from(
            cells
                .map(|c| match c {
                    Some(Cell::Date(v)) => v.and_then(days_since_epoch),
                    _ => None,
                })
                .collect::<Vec<Option<i32>>>(),
        )),
        CellKind::Float => Arc::new(Float64Array::from(
            cells
                .map(|c| match c {
                    Some(Cell::Float(v)) => *v,
                    _ => None,
                })
                .collect::<Vec<Option<f64>>>(),
        )),
        CellKind::Int => Arc::new(Int64Array::from(
            cells
                .map(|c| match c {
                    Some(Cell::Int(v)) => *v,
                    _ => None,
                })
                .collect::<Vec<Option<i64>>>(),
        )),
    }
}

/// Single-batch Parquet file with typed columns.
#[tracing::instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn write_table_parquet(table: &Table, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("creating output directory")?;
    }
    let schema = Arc::new(arrow_schema(table));
    let columns: Vec<ArrayRef> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| arrow_column(table, i, c.kind))
        .collect();
    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("building RecordBatch")?;

    let file =
        File::create(path).with_context(|| format!("creating file {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    let metadata = fs::metadata(path).context("getting file metadata")?;
    Ok(metadata.len())
}

/// Write each table to `<dir>/<name>.<ext>` and return where it went.
pub fn save_tables<'a, I>(tables: I, dir: &Path, format: OutputFormat) -> Result<BTreeMap<String, PathBuf>>
where
    I: IntoIterator<Item = (&'a str, &'a Table)>,
{
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut paths = BTreeMap::new();
    for (name, table) in tables {
        let path = dir.join(format!("{}.{}", name, format.extension()));
        match format {
            OutputFormat::Csv => write_table_csv(table, &path)?,
            OutputFormat::Parquet => {
                write_table_parquet(table, &path)?;
            }
        }
        info!(table = name, rows = table.len(), path = %path.display(), "saved table");
        paths.insert(name.to_string(), path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    fn sample() -> Table {
        Table {
            columns: vec![
                Column::new("cnpj", CellKind::Text),
                Column::new("data_cotacao", CellKind::Date),
                Column::new("valor_cota", CellKind::Float),
                Column::new("numero_cotistas", CellKind::Int),
            ],
            rows: vec![
                vec![
                    Cell::Text(Some("11222333000181".into())),
                    Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 31)),
                    Cell::Float(Some(1.5)),
                    Cell::Int(Some(10)),
                ],
                vec![
                    Cell::Text(None),
                    Cell::Date(None),
                    Cell::Float(None),
                    Cell::Int(None),
                ],
            ],
        }
    }

    #[test]
    fn csv_has_header_and_empty_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_table_csv(&sample(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "cnpj,data_cotacao,valor_cota,numero_cotistas");
        assert_eq!(lines[1], "11222333000181,2024-03-31,1.5,10");
        assert_eq!(lines[2], ",,,");
    }

    #[test]
    fn parquet_keeps_types_and_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let bytes = write_table_parquet(&sample(), &path).unwrap();
        assert!(bytes > 0);

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Date32);
        let dates = batch
            .column(1)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(dates.value(0), 19813);
        assert!(dates.is_null(1));
        let counts = batch
            .column(3)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(counts.value(0), 10);
    }

    #[test]
    fn save_tables_names_files_after_tables() {
        let dir = tempdir().unwrap();
        let empty = Table {
            columns: vec![Column::new("gestora", CellKind::Text)],
            rows: Vec::new(),
        };
        let sample = sample();
        let tables = vec![("fato_cota_diaria", &sample), ("dim_gestora", &empty)];
        let paths = save_tables(tables, dir.path(), OutputFormat::Csv).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths["dim_gestora"], dir.path().join("dim_gestora.csv"));
        assert_eq!(fs::read_to_string(&paths["dim_gestora"]).unwrap(), "gestora\n");

        let paths = save_tables(
            vec![("dim_gestora", &empty)],
            &dir.path().join("pq"),
            OutputFormat::Parquet,
        )
        .unwrap();
        assert!(paths["dim_gestora"].ends_with("pq/dim_gestora.parquet"));
        assert!(paths["dim_gestora"].exists());
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("parquet".parse::<OutputFormat>().unwrap(), OutputFormat::Parquet);
        assert!("xlsx".parse::<OutputFormat>().is_err());
    }
}
