//! B3 quota spreadsheets, merged into the daily facts with `fonte = "B3"`.
//!
//! Each configured URL points at one spreadsheet (`.xlsx`, `.xls`, `.ods`)
//! or a `;` CSV. Only the first sheet is read. A spreadsheet that cannot be
//! fetched or read is skipped and reported; B3 never fails the run.

use calamine::{open_workbook_auto, Data, Reader};
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostics, Event};
use crate::error::{ExtractError, PipelineError};
use crate::fetch::Downloader;
use crate::process::collect::{for_each_archive, Failure, KindAccumulator};
use crate::process::mapping::{Canonical, ColumnMap, FieldSpec, MappedRow};
use crate::process::normalize::{normalize_cnpj, parse_date_with, parse_decimal};
use crate::process::records::CotaDiaria;
use crate::process::utils::decode_text;
use crate::process::{parse_semicolon_csv, RawTable};

pub const FAMILY: &str = "b3";

/// Provenance tag for rows read from B3 spreadsheets.
pub const FONTE_B3: &str = "B3";

/// B3 writes dates day first; ISO shows up in exported CSVs.
const B3_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// A daily quota row as B3 lays it out. Headers are matched lowercased.
#[derive(Clone, Debug, PartialEq)]
pub struct B3Cota(pub CotaDiaria);

impl Canonical for B3Cota {
    const COLUMN_MAP: &'static ColumnMap = &ColumnMap {
        table: "b3_cotas",
        fields: &[
            FieldSpec::required("cnpj", &["cnpj do fundo", "cnpj"]),
            FieldSpec::required("data_cotacao", &["data", "data de referência"]),
            FieldSpec::optional("valor_cota", &["valor da cota"]),
            FieldSpec::optional("patrimonio_liquido", &["patrimônio líquido"]),
        ],
    };

    fn from_mapped(row: &MappedRow<'_>) -> Self {
        Self(CotaDiaria {
            cnpj: row.get("cnpj").and_then(normalize_cnpj),
            data_cotacao: row
                .get("data_cotacao")
                .and_then(|v| parse_date_with(v, B3_DATE_FORMATS)),
            valor_total: None,
            valor_cota: row.get("valor_cota").and_then(parse_decimal),
            patrimonio_liquido: row.get("patrimonio_liquido").and_then(parse_decimal),
            captacoes: None,
            resgates: None,
            numero_cotistas: 0,
            fonte: FONTE_B3.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct B3Parse {
    pub cotas: Vec<CotaDiaria>,
    pub failures: Vec<Failure>,
}

/// Download every spreadsheet in `urls` into `<workdir>/b3` and read the
/// quota rows, in URL order.
pub async fn parse_b3<D: Downloader>(
    downloader: &D,
    urls: &[String],
    workdir: &Path,
    diagnostics: &dyn Diagnostics,
) -> Result<B3Parse, PipelineError> {
    let staging = workdir.join(FAMILY);
    fs::create_dir_all(&staging).map_err(|source| PipelineError::Io {
        path: staging.clone(),
        source,
    })?;
    let mut failures = Vec::new();
    let mut cotas = KindAccumulator::<B3Cota>::new(FAMILY, "cota_diaria", "");

    for_each_archive(
        downloader,
        urls,
        &staging,
        FAMILY,
        diagnostics,
        &mut failures,
        |url, path, failures| cotas.absorb_raw(url, read_planilha(path), diagnostics, failures),
    )
    .await;

    diagnostics.emit(Event::FamilyFinished {
        family: FAMILY,
        succeeded: cotas.succeeded(),
        failed: failures.len(),
    });

    Ok(B3Parse {
        cotas: cotas.concat().into_iter().map(|B3Cota(c)| c).collect(),
        failures,
    })
}

/// Read the first sheet of a spreadsheet (or a `;` CSV) as strings, headers
/// trimmed and lowercased.
pub fn read_planilha(path: &Path) -> Result<RawTable, ExtractError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let mut raw = if is_csv {
        let buf = fs::read(path).map_err(|source| ExtractError::Io {
            archive: path.to_path_buf(),
            source,
        })?;
        parse_semicolon_csv(name, decode_text(buf))?
    } else {
        read_first_sheet(path, name)?
    };
    for header in raw.headers.iter_mut() {
        *header = header.trim().to_lowercase();
    }
    Ok(raw)
}

fn read_first_sheet(path: &Path, name: String) -> Result<RawTable, ExtractError> {
    let workbook_error = |source| ExtractError::Workbook {
        path: PathBuf::from(path),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ExtractError::EmptySheet {
            path: path.to_path_buf(),
        })?;
    let range = workbook.worksheet_range(&first).map_err(workbook_error)?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| ExtractError::EmptySheet {
            path: path.to_path_buf(),
        })?
        .iter()
        .map(cell_text)
        .collect();
    let rows = rows
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(RawTable {
        source: name,
        headers,
        rows,
    })
}

/// Render one cell the way the text parsers expect it.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.split('T').next().unwrap_or_default().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{MemoryDiagnostics, Stage};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    const PLANILHA: &str = "CNPJ do Fundo;Data;Valor da Cota;Patrimônio Líquido\n\
                            11.222.333/0001-81;28/02/2024;1,0512;1.050.000,00\n\
                            11.222.333/0001-81;29/02/2024;1,0520;1.051.000,00\n";

    #[test]
    fn csv_planilha_rows_are_tagged_b3() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cotas.csv");
        fs::write(&path, PLANILHA).unwrap();

        let raw = read_planilha(&path).unwrap();
        assert_eq!(raw.headers[0], "cnpj do fundo");
        assert_eq!(raw.headers[3], "patrimônio líquido");

        let mapped = crate::process::mapping::map_table::<B3Cota>(&raw).unwrap();
        let first = &mapped.rows[0].0;
        assert_eq!(first.cnpj.as_ref().unwrap().as_str(), "11222333000181");
        assert_eq!(first.data_cotacao, NaiveDate::from_ymd_opt(2024, 2, 28));
        assert_eq!(first.valor_cota, Some(1.0512));
        assert_eq!(first.patrimonio_liquido, Some(1_050_000.0));
        assert_eq!(first.numero_cotistas, 0);
        assert_eq!(first.fonte, FONTE_B3);
        assert!(mapped.gaps.is_empty());
    }

    #[test]
    fn corrupt_workbook_is_a_workbook_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cotas.xlsx");
        fs::write(&path, b"not a spreadsheet").unwrap();
        assert!(matches!(
            read_planilha(&path),
            Err(ExtractError::Workbook { .. })
        ));
    }

    #[test]
    fn cells_render_as_parser_text() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::Float(1.05)), "1.05");
        assert_eq!(cell_text(&Data::Int(120)), "120");
        assert_eq!(cell_text(&Data::String("Fundo".into())), "Fundo");
        assert_eq!(
            cell_text(&Data::DateTimeIso("2024-02-28T00:00:00".into())),
            "2024-02-28"
        );
    }

    #[tokio::test]
    async fn bad_spreadsheet_is_skipped_not_fatal() {
        use crate::testutil::FakeDownloader;

        let src = tempdir().unwrap();
        let work = tempdir().unwrap();
        let good = src.path().join("good.csv");
        fs::write(&good, PLANILHA).unwrap();
        let bad = src.path().join("bad.xlsx");
        fs::write(&bad, b"garbage").unwrap();
        let urls = vec![
            "https://b3.example/cotas.xlsx".to_string(),
            "https://b3.example/cotas.csv".to_string(),
            "https://b3.example/missing.xlsx".to_string(),
        ];
        let downloader = FakeDownloader::new()
            .serve(&urls[0], bad)
            .serve(&urls[1], good);
        let diagnostics = MemoryDiagnostics::new();

        let parsed = parse_b3(&downloader, &urls, work.path(), &diagnostics)
            .await
            .unwrap();

        assert_eq!(parsed.cotas.len(), 2);
        assert!(parsed.cotas.iter().all(|c| c.fonte == FONTE_B3));
        let stages: Vec<Stage> = parsed.failures.iter().map(|f| f.stage).collect();
        assert_eq!(stages, vec![Stage::Extract, Stage::Download]);
        assert!(work.path().join("b3/cotas.csv").exists());
    }
}
