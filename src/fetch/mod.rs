// src/fetch/mod.rs

/// Month window + archive URL construction for the CVM open-data portal
pub mod urls;

/// Module for downloading a single ZIP to disk
pub mod zips;

pub use urls::{build_monthly_urls, month_window, ArchiveSource, Month, MAX_WINDOW_MONTHS};
pub use zips::{Downloader, HttpDownloader};
