//! Parser for the CVM daily quota archives (`inf_diario_*`).

use std::path::Path;

use crate::diagnostics::{Diagnostics, Event};
use crate::error::PipelineError;
use crate::fetch::Downloader;
use crate::process::collect::{for_each_archive, staging_dir, Failure, KindAccumulator};
use crate::process::records::CotaDiaria;

pub const FAMILY: &str = "inf_diario";

/// Each daily archive holds a single CSV.
const CSV_PATTERN: &str = ".csv";

#[derive(Debug, Default)]
pub struct DailyParse {
    pub cotas: Vec<CotaDiaria>,
    pub failures: Vec<Failure>,
}

/// Download and parse every daily archive in `urls`, most recent first.
///
/// Fails only when no archive at all could be read.
pub async fn parse_inf_diario<D: Downloader>(
    downloader: &D,
    urls: &[String],
    workdir: &Path,
    diagnostics: &dyn Diagnostics,
) -> Result<DailyParse, PipelineError> {
    let staging = staging_dir(workdir, FAMILY)?;
    let mut failures = Vec::new();
    let mut cotas = KindAccumulator::<CotaDiaria>::new(FAMILY, "cota_diaria", CSV_PATTERN);

    for_each_archive(
        downloader,
        urls,
        &staging,
        FAMILY,
        diagnostics,
        &mut failures,
        |url, zip_path, failures| cotas.absorb(url, zip_path, diagnostics, failures),
    )
    .await;

    diagnostics.emit(Event::FamilyFinished {
        family: FAMILY,
        succeeded: cotas.succeeded(),
        failed: failures.len(),
    });
    if cotas.succeeded() == 0 {
        return Err(PipelineError::TotalFailure { family: FAMILY });
    }

    Ok(DailyParse {
        cotas: cotas.concat(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemoryDiagnostics;
    use crate::testutil::{diario_csv, write_zip, FakeDownloader};
    use tempfile::tempdir;

    const URLS: [&str; 3] = [
        "https://example.test/inf_diario_fi_202403.zip",
        "https://example.test/inf_diario_fi_202402.zip",
        "https://example.test/inf_diario_fi_202401.zip",
    ];

    fn urls() -> Vec<String> {
        URLS.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn skips_failed_download_and_keeps_the_rest() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let march = diario_csv(&[
            ("11.222.333/0001-81", "2024-03-01", "1,1", "100"),
            ("11.222.333/0001-81", "2024-03-04", "1,2", "110"),
        ]);
        let january = diario_csv(&[("11.222.333/0001-81", "2024-01-31", "1,0", "90")]);
        let downloader = FakeDownloader::new()
            .serve(
                URLS[0],
                write_zip(src.path(), "a.zip", &[("inf_diario_fi_202403.csv", march.as_bytes())]),
            )
            .serve(
                URLS[2],
                write_zip(src.path(), "c.zip", &[("inf_diario_fi_202401.csv", january.as_bytes())]),
            );
        let diagnostics = MemoryDiagnostics::new();

        let parsed = parse_inf_diario(&downloader, &urls(), work.path(), &diagnostics)
            .await
            .unwrap();

        // month order, then file order
        let dates: Vec<String> = parsed
            .cotas
            .iter()
            .map(|c| c.data_cotacao.unwrap().to_string())
            .collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-04", "2024-01-31"]);
        assert_eq!(parsed.cotas[1].valor_cota, Some(1.2));
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].url, URLS[1]);
        assert!(diagnostics
            .events()
            .iter()
            .any(|e| matches!(e, Event::DownloadFailed { url, .. } if url == URLS[1])));
        assert_eq!(downloader.requested(), urls());
        assert!(work
            .path()
            .join("cvm/inf_diario/inf_diario_fi_202403.zip")
            .exists());
    }

    #[tokio::test]
    async fn all_downloads_failing_is_total_failure() {
        let work = tempdir().unwrap();
        let downloader = FakeDownloader::new();
        let diagnostics = MemoryDiagnostics::new();

        let err = parse_inf_diario(&downloader, &urls(), work.path(), &diagnostics)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TotalFailure { family: "inf_diario" }));
    }

    #[tokio::test]
    async fn unreadable_archive_counts_as_failure() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let broken = src.path().join("broken.zip");
        std::fs::write(&broken, b"not a zip").unwrap();
        let good = diario_csv(&[("11.222.333/0001-81", "2024-02-01", "1", "1")]);
        let downloader = FakeDownloader::new().serve(URLS[0], broken).serve(
            URLS[1],
            write_zip(src.path(), "b.zip", &[("x.csv", good.as_bytes())]),
        );

        let parsed = parse_inf_diario(&downloader, &urls(), work.path(), &MemoryDiagnostics::new())
            .await
            .unwrap();
        assert_eq!(parsed.cotas.len(), 1);
        assert_eq!(parsed.failures.len(), 2);
    }

    #[tokio::test]
    async fn empty_file_is_a_success_with_no_rows() {
        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let empty = diario_csv(&[]);
        let downloader = FakeDownloader::new().serve(
            URLS[0],
            write_zip(src.path(), "a.zip", &[("x.csv", empty.as_bytes())]),
        );

        let parsed = parse_inf_diario(&downloader, &urls(), work.path(), &MemoryDiagnostics::new())
            .await
            .unwrap();
        assert!(parsed.cotas.is_empty());
    }
}
