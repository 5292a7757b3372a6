// src/output/frontend.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::{
    cmp::Ordering,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::config::{FundConfig, PipelineConfig};
use crate::pipeline::StagingTables;
use crate::process::normalize::{normalize_cnpj, Cnpj};
use crate::table::FundKeyed;

const TOP_HOLDINGS: usize = 10;

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    cnpj: &'a str,
    nome: &'a str,
    categoria_cvm: &'a str,
    gestora: &'a str,
    classe_anbima: Option<&'a str>,
    grupo_looker: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct IndexEntry<'a> {
    #[serde(flatten)]
    metadata: Metadata<'a>,
    dataset_path: String,
    ultima_data: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct Index<'a> {
    funds: Vec<IndexEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct DailyPoint {
    data: NaiveDate,
    valor_cota: Option<f64>,
    patrimonio_liquido: Option<f64>,
    numero_cotistas: i64,
}

#[derive(Debug, Serialize)]
struct CotistasPoint<'a> {
    data: NaiveDate,
    classe_cotistas: Option<&'a str>,
    numero_cotistas: Option<i64>,
    patrimonio_liquido: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Holding<'a> {
    tipo_ativo: Option<&'a str>,
    emissor: Option<&'a str>,
    isin: Option<&'a str>,
    valor_mercado: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Series<'a> {
    daily: Vec<DailyPoint>,
    cotistas: Vec<CotistasPoint<'a>>,
}

#[derive(Debug, Serialize)]
struct LatestHoldings<'a> {
    data_referencia: Option<NaiveDate>,
    top: Vec<Holding<'a>>,
}

#[derive(Debug, Serialize)]
struct FundPayload<'a> {
    metadata: Metadata<'a>,
    series: Series<'a>,
    latest_holdings: LatestHoldings<'a>,
}

fn metadata<'a>(fund: &'a FundConfig, cnpj: &'a Cnpj) -> Metadata<'a> {
    Metadata {
        cnpj: cnpj.as_str(),
        nome: &fund.nome,
        categoria_cvm: &fund.categoria_cvm,
        gestora: &fund.gestora,
        classe_anbima: fund.classe_anbima.as_deref(),
        grupo_looker: fund.grupo_looker.as_deref(),
    }
}

fn of_fund<'a, R: FundKeyed>(rows: &'a [R], cnpj: &'a Cnpj) -> impl Iterator<Item = &'a R> + 'a {
    rows.iter().filter(move |r| r.cnpj() == Some(cnpj))
}

/// Larger market values first, missing values last.
fn by_market_value_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn fund_payload<'a>(fund: &'a FundConfig, cnpj: &'a Cnpj, tables: &'a StagingTables) -> FundPayload<'a> {
    let mut daily: Vec<DailyPoint> = of_fund(&tables.fato_cota_diaria, cnpj)
        .filter_map(|r| {
            Some(DailyPoint {
                data: r.data_cotacao?,
                valor_cota: r.valor_cota,
                patrimonio_liquido: r.patrimonio_liquido,
                numero_cotistas: r.numero_cotistas,
            })
        })
        .collect();
    daily.sort_by_key(|p| p.data);

    let mut cotistas: Vec<CotistasPoint> = of_fund(&tables.fato_cotistas_mensal, cnpj)
        .filter_map(|r| {
            Some(CotistasPoint {
                data: r.data_referencia?,
                classe_cotistas: r.classe_cotistas.as_deref(),
                numero_cotistas: r.numero_cotistas,
                patrimonio_liquido: r.patrimonio_liquido,
            })
        })
        .collect();
    cotistas.sort_by_key(|p| p.data);

    // holdings of the most recent reference month only
    let latest = of_fund(&tables.fato_carteira_mensal, cnpj)
        .filter_map(|r| r.data_referencia)
        .max();
    let mut holdings: Vec<_> = of_fund(&tables.fato_carteira_mensal, cnpj)
        .filter(|r| latest.is_some() && r.data_referencia == latest)
        .collect();
    holdings.sort_by(|a, b| by_market_value_desc(a.valor_mercado, b.valor_mercado));
    let top = holdings
        .into_iter()
        .take(TOP_HOLDINGS)
        .map(|r| Holding {
            tipo_ativo: r.tipo_ativo.as_deref(),
            emissor: r.emissor.as_deref(),
            isin: r.isin.as_deref(),
            valor_mercado: r.valor_mercado,
        })
        .collect();

    FundPayload {
        metadata: metadata(fund, cnpj),
        series: Series { daily, cotistas },
        latest_holdings: LatestHoldings {
            data_referencia: latest,
            top,
        },
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))
}

/// Write `index.json` plus one `funds/<cnpj>.json` per configured fund.
/// Returns the index path.
#[tracing::instrument(level = "debug", skip(config, tables))]
pub fn export_frontend_payload(
    config: &PipelineConfig,
    tables: &StagingTables,
    dir: &Path,
) -> Result<PathBuf> {
    let funds_dir = dir.join("funds");
    fs::create_dir_all(&funds_dir).with_context(|| format!("creating {}", funds_dir.display()))?;

    let normalized: Vec<(&FundConfig, Cnpj)> = config
        .fundos
        .iter()
        .filter_map(|f| match normalize_cnpj(&f.cnpj) {
            Some(cnpj) => Some((f, cnpj)),
            None => {
                warn!(cnpj = %f.cnpj, "skipping fund with invalid CNPJ in frontend export");
                None
            }
        })
        .collect();

    let mut entries = Vec::with_capacity(normalized.len());
    for (fund, cnpj) in &normalized {
        let payload = fund_payload(fund, cnpj, tables);
        let dataset_path = format!("funds/{}.json", cnpj);
        write_json(&payload, &dir.join(&dataset_path))?;

        entries.push(IndexEntry {
            metadata: metadata(fund, cnpj),
            dataset_path,
            ultima_data: payload.series.daily.last().map(|p| p.data),
        });
    }

    let index_path = dir.join("index.json");
    write_json(&Index { funds: entries }, &index_path)?;
    info!(funds = normalized.len(), path = %index_path.display(), "frontend payload written");
    Ok(index_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{
        build_dim_categoria_cvm, build_dim_classe_anbima, build_dim_fundo, build_dim_gestora,
    };
    use crate::process::records::{CarteiraMensal, CotaDiaria, CotistasMensal};
    use serde_json::Value;
    use tempfile::tempdir;

    const CNPJ: &str = "12345678000190";

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            fundos: vec![FundConfig {
                cnpj: CNPJ.into(),
                nome: "Fundo Teste".into(),
                categoria_cvm: "Renda Fixa".into(),
                gestora: "Gestora X".into(),
                classe_anbima: Some("Soberano".into()),
                grupo_looker: Some("Institucional".into()),
            }],
            ..PipelineConfig::default()
        }
    }

    fn cota(date: Option<NaiveDate>, valor: f64) -> CotaDiaria {
        CotaDiaria {
            cnpj: normalize_cnpj(CNPJ),
            data_cotacao: date,
            valor_total: None,
            valor_cota: Some(valor),
            patrimonio_liquido: Some(valor * 1_000_000.0),
            captacoes: None,
            resgates: None,
            numero_cotistas: 100,
            fonte: "CVM".into(),
        }
    }

    fn holding(date: Option<NaiveDate>, tipo: &str, valor: Option<f64>) -> CarteiraMensal {
        CarteiraMensal {
            cnpj: normalize_cnpj(CNPJ),
            data_referencia: date,
            tipo_ativo: Some(tipo.into()),
            subtipo_ativo: None,
            emissor: None,
            setor: None,
            isin: None,
            valor_mercado: valor,
            quantidade: None,
            fonte: "CVM".into(),
        }
    }

    fn tables(cfg: &PipelineConfig) -> StagingTables {
        let mut carteira = vec![
            holding(ymd(2024, 6, 1), "Antigo", Some(9e9)),
            holding(ymd(2024, 7, 1), "Caixa", Some(450_000.0)),
            holding(ymd(2024, 7, 1), "Sem valor", None),
            holding(ymd(2024, 7, 1), "Titulos Publicos", Some(750_000.0)),
        ];
        for i in 0..12 {
            carteira.push(holding(ymd(2024, 7, 1), "Outros", Some(i as f64)));
        }
        StagingTables {
            fato_cota_diaria: vec![cota(ymd(2024, 6, 2), 1.05), cota(ymd(2024, 6, 1), 1.0), cota(None, 9.0)],
            fato_carteira_mensal: carteira,
            fato_cotistas_mensal: vec![CotistasMensal {
                cnpj: normalize_cnpj(CNPJ),
                data_referencia: ymd(2024, 6, 1),
                classe_cotistas: None,
                numero_cotistas: Some(100),
                patrimonio_liquido: Some(1_000_000.0),
                fonte: "CVM".into(),
            }],
            dim_fundo: build_dim_fundo(cfg),
            dim_gestora: build_dim_gestora(cfg),
            dim_categoria_cvm: build_dim_categoria_cvm(cfg),
            dim_classe_anbima: build_dim_classe_anbima(cfg),
        }
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_index_and_fund_files() {
        let dir = tempdir().unwrap();
        let cfg = config();
        let index_path = export_frontend_payload(&cfg, &tables(&cfg), dir.path()).unwrap();

        let index = read(&index_path);
        assert_eq!(index["funds"][0]["cnpj"], CNPJ);
        assert_eq!(index["funds"][0]["dataset_path"], "funds/12345678000190.json");
        assert_eq!(index["funds"][0]["ultima_data"], "2024-06-02");

        let fund = read(&dir.path().join("funds").join(format!("{}.json", CNPJ)));
        assert_eq!(fund["metadata"]["nome"], "Fundo Teste");

        // undated rows are left out, the rest sorted by date
        let daily = fund["series"]["daily"].as_array().unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0]["data"], "2024-06-01");
        assert_eq!(fund["series"]["cotistas"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn top_holdings_come_from_latest_month() {
        let dir = tempdir().unwrap();
        let cfg = config();
        export_frontend_payload(&cfg, &tables(&cfg), dir.path()).unwrap();
        let fund = read(&dir.path().join("funds").join(format!("{}.json", CNPJ)));

        let latest = &fund["latest_holdings"];
        assert_eq!(latest["data_referencia"], "2024-07-01");
        let top = latest["top"].as_array().unwrap();
        assert_eq!(top.len(), TOP_HOLDINGS);
        assert_eq!(top[0]["tipo_ativo"], "Titulos Publicos");
        assert_eq!(top[1]["tipo_ativo"], "Caixa");
        assert!(top.iter().all(|h| h["tipo_ativo"] != "Antigo"));
    }

    #[test]
    fn fund_without_data_gets_empty_series() {
        let dir = tempdir().unwrap();
        let cfg = config();
        let empty = StagingTables {
            fato_cota_diaria: Vec::new(),
            fato_carteira_mensal: Vec::new(),
            fato_cotistas_mensal: Vec::new(),
            ..tables(&cfg)
        };
        export_frontend_payload(&cfg, &empty, dir.path()).unwrap();
        let fund = read(&dir.path().join("funds").join(format!("{}.json", CNPJ)));
        assert!(fund["series"]["daily"].as_array().unwrap().is_empty());
        assert!(fund["latest_holdings"]["data_referencia"].is_null());
        assert!(fund["latest_holdings"]["top"].as_array().unwrap().is_empty());
    }
}
