//! Helpers shared by the unit tests: in-memory archives and a fake downloader.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::error::DownloadError;
use crate::fetch::Downloader;

/// Write a ZIP named `name` under `dir` holding `entries` in the given order.
pub fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);
        for (entry, content) in entries {
            zip.start_file(*entry, options.clone()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }
    let path = dir.join(name);
    fs::write(&path, &buf).unwrap();
    path
}

/// Serves prepared archives by URL; unknown URLs fail like a 404.
#[derive(Default)]
pub struct FakeDownloader {
    archives: HashMap<String, PathBuf>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, archive: PathBuf) -> Self {
        self.archives.insert(url.to_string(), archive);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Downloader for FakeDownloader {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, DownloadError> {
        self.requested.lock().unwrap().push(url.to_string());
        let src = self.archives.get(url).ok_or_else(|| DownloadError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::copy(src, dest).map_err(|source| DownloadError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(dest.to_path_buf())
    }
}

pub const DIARIO_HEADER: &str =
    "CNPJ_FUNDO;DT_COMPTC;VL_TOTAL;VL_QUOTA;VL_PATRIM_LIQ;CAPTC_DIA;RESG_DIA;NR_COTST";

/// A daily-quota CSV with one row per `(cnpj, date, quota, net worth)`.
pub fn diario_csv(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut out = format!("{}\n", DIARIO_HEADER);
    for (cnpj, date, quota, pl) in rows {
        out.push_str(&format!("{};{};0;{};{};0;0;1\n", cnpj, date, quota, pl));
    }
    out
}
