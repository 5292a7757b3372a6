// src/process/mod.rs
use csv::ReaderBuilder;
use std::{
    fs::File,
    io::{Cursor, Read},
    path::Path,
};
use tracing::debug;
use zip::ZipArchive;

use crate::error::ExtractError;

pub mod b3;
pub mod collect;
pub mod inf_diario;
pub mod inf_mensal;
pub mod mapping;
pub mod normalize;
pub mod records;
pub mod utils;

use utils::{clean_header, decode_text};

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Name of the archive entry the table was read from.
    pub source: String,
    /// Column names exactly as the file declares them.
    pub headers: Vec<String>,
    /// Each data row, one raw string per field.
    pub rows: Vec<Vec<String>>,
}

/// Open `zip_path`, pick the first file entry (in archive order) whose name
/// contains `pattern`, and read it as a `;`-delimited CSV with every cell kept
/// as a string. Decimal commas and dates are left for the column mapper.
#[tracing::instrument(level = "debug", skip(zip_path), fields(path = %zip_path.as_ref().display()))]
pub fn load_csv_from_archive<P: AsRef<Path>>(
    zip_path: P,
    pattern: &str,
) -> Result<RawTable, ExtractError> {
    let zip_path = zip_path.as_ref();

    // 1) Open the ZIP
    let file = File::open(zip_path).map_err(|source| ExtractError::Io {
        archive: zip_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| ExtractError::Zip {
        archive: zip_path.to_path_buf(),
        source,
    })?;

    // 2) Find the first matching entry and buffer it
    let mut matched: Option<(String, Vec<u8>)> = None;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|source| ExtractError::Zip {
            archive: zip_path.to_path_buf(),
            source,
        })?;
        let name = entry.name().to_string();
        if !entry.is_file() || !name.contains(pattern) {
            continue;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|source| ExtractError::Io {
                archive: zip_path.to_path_buf(),
                source,
            })?;
        matched = Some((name, buf));
        break;
    }
    let (entry_name, buf) = matched.ok_or_else(|| ExtractError::NoMatch {
        pattern: pattern.to_string(),
        archive: zip_path.to_path_buf(),
    })?;
    debug!(entry = %entry_name, bytes = buf.len(), "matched archive entry");

    // 3) Parse the CSV, all cells as strings
    parse_semicolon_csv(entry_name, decode_text(buf))
}

pub(crate) fn parse_semicolon_csv(entry_name: String, text: String) -> Result<RawTable, ExtractError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(text.into_bytes()));

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|source| ExtractError::Csv {
            entry: entry_name.clone(),
            record: 0,
            source,
        })?
        .iter()
        .map(clean_header)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|source| ExtractError::Csv {
            entry: entry_name.clone(),
            record: idx + 1,
            source,
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable {
        source: entry_name,
        headers,
        rows,
    })
}
