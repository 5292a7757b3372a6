//! Canonical fact rows of the three dataset families.

use chrono::NaiveDate;

use crate::process::mapping::{Canonical, ColumnMap, FieldSpec, MappedRow};
use crate::process::normalize::{normalize_cnpj, parse_count, parse_date, parse_decimal, Cnpj};
use crate::process::utils::clean_str;
use crate::table::{Cell, CellKind, Column, FundKeyed, Record};

/// Provenance tag for everything read from the CVM portal.
pub const FONTE_CVM: &str = "CVM";

const CNPJ_SOURCES: &[&str] = &["CNPJ_FUNDO", "CNPJ_FUNDO_CLASSE"];

fn text(row: &MappedRow<'_>, canonical: &str) -> Option<String> {
    row.get(canonical)
        .map(clean_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn cnpj(row: &MappedRow<'_>) -> Option<Cnpj> {
    row.get("cnpj").and_then(normalize_cnpj)
}

fn date(row: &MappedRow<'_>, canonical: &str) -> Option<NaiveDate> {
    row.get(canonical).and_then(parse_date)
}

fn decimal(row: &MappedRow<'_>, canonical: &str) -> Option<f64> {
    row.get(canonical).and_then(parse_decimal)
}

fn count(row: &MappedRow<'_>, canonical: &str) -> Option<i64> {
    row.get(canonical).and_then(parse_count)
}

/// One row of `fato_cota_diaria`.
#[derive(Clone, Debug, PartialEq)]
pub struct CotaDiaria {
    pub cnpj: Option<Cnpj>,
    pub data_cotacao: Option<NaiveDate>,
    pub valor_total: Option<f64>,
    pub valor_cota: Option<f64>,
    pub patrimonio_liquido: Option<f64>,
    pub captacoes: Option<f64>,
    pub resgates: Option<f64>,
    /// Missing counts are reported as 0.
    pub numero_cotistas: i64,
    pub fonte: String,
}

impl Canonical for CotaDiaria {
    const COLUMN_MAP: &'static ColumnMap = &ColumnMap {
        table: "inf_diario",
        fields: &[
            FieldSpec::required("cnpj", CNPJ_SOURCES),
            FieldSpec::required("data_cotacao", &["DT_COMPTC"]),
            FieldSpec::optional("valor_total", &["VL_TOTAL"]),
            FieldSpec::optional("valor_cota", &["VL_QUOTA"]),
            FieldSpec::optional("patrimonio_liquido", &["VL_PATRIM_LIQ"]),
            FieldSpec::optional("captacoes", &["CAPTC_DIA"]),
            FieldSpec::optional("resgates", &["RESG_DIA"]),
            FieldSpec::optional("numero_cotistas", &["NR_COTST"]),
        ],
    };

    fn from_mapped(row: &MappedRow<'_>) -> Self {
        Self {
            cnpj: cnpj(row),
            data_cotacao: date(row, "data_cotacao"),
            valor_total: decimal(row, "valor_total"),
            valor_cota: decimal(row, "valor_cota"),
            patrimonio_liquido: decimal(row, "patrimonio_liquido"),
            captacoes: decimal(row, "captacoes"),
            resgates: decimal(row, "resgates"),
            numero_cotistas: count(row, "numero_cotistas").unwrap_or(0),
            fonte: FONTE_CVM.to_string(),
        }
    }
}

impl Record for CotaDiaria {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("cnpj", CellKind::Text),
            Column::new("data_cotacao", CellKind::Date),
            Column::new("valor_total", CellKind::Float),
            Column::new("valor_cota", CellKind::Float),
            Column::new("patrimonio_liquido", CellKind::Float),
            Column::new("captacoes", CellKind::Float),
            Column::new("resgates", CellKind::Float),
            Column::new("numero_cotistas", CellKind::Int),
            Column::new("fonte", CellKind::Text),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::from(&self.cnpj),
            Cell::Date(self.data_cotacao),
            Cell::Float(self.valor_total),
            Cell::Float(self.valor_cota),
            Cell::Float(self.patrimonio_liquido),
            Cell::Float(self.captacoes),
            Cell::Float(self.resgates),
            Cell::Int(Some(self.numero_cotistas)),
            Cell::from(self.fonte.as_str()),
        ]
    }
}

impl FundKeyed for CotaDiaria {
    fn cnpj(&self) -> Option<&Cnpj> {
        self.cnpj.as_ref()
    }
}

/// One row of `fato_carteira_mensal`.
#[derive(Clone, Debug, PartialEq)]
pub struct CarteiraMensal {
    pub cnpj: Option<Cnpj>,
    pub data_referencia: Option<NaiveDate>,
    pub tipo_ativo: Option<String>,
    pub subtipo_ativo: Option<String>,
    pub emissor: Option<String>,
    pub setor: Option<String>,
    pub isin: Option<String>,
    pub valor_mercado: Option<f64>,
    pub quantidade: Option<f64>,
    pub fonte: String,
}

impl Canonical for CarteiraMensal {
    const COLUMN_MAP: &'static ColumnMap = &ColumnMap {
        table: "carteira",
        fields: &[
            FieldSpec::required("cnpj", CNPJ_SOURCES),
            FieldSpec::required("data_referencia", &["DT_COMPTC"]),
            FieldSpec::optional("tipo_ativo", &["TP_APLIC"]),
            FieldSpec::optional("subtipo_ativo", &["TP_ATIVO"]),
            FieldSpec::optional("emissor", &["EMISSOR"]),
            FieldSpec::optional("setor", &["SETOR"]),
            FieldSpec::optional("isin", &["COD_ISIN"]),
            FieldSpec::optional("valor_mercado", &["VL_MERC_POS_FINAL"]),
            FieldSpec::optional("quantidade", &["QT_POS_FINAL"]),
        ],
    };

    fn from_mapped(row: &MappedRow<'_>) -> Self {
        Self {
            cnpj: cnpj(row),
            data_referencia: date(row, "data_referencia"),
            tipo_ativo: text(row, "tipo_ativo"),
            subtipo_ativo: text(row, "subtipo_ativo"),
            emissor: text(row, "emissor"),
            setor: text(row, "setor"),
            isin: text(row, "isin"),
            valor_mercado: decimal(row, "valor_mercado"),
            quantidade: decimal(row, "quantidade"),
            fonte: FONTE_CVM.to_string(),
        }
    }
}

impl Record for CarteiraMensal {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("cnpj", CellKind::Text),
            Column::new("data_referencia", CellKind::Date),
            Column::new("tipo_ativo", CellKind::Text),
            Column::new("subtipo_ativo", CellKind::Text),
            Column::new("emissor", CellKind::Text),
            Column::new("setor", CellKind::Text),
            Column::new("isin", CellKind::Text),
            Column::new("valor_mercado", CellKind::Float),
            Column::new("quantidade", CellKind::Float),
            Column::new("fonte", CellKind::Text),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::from(&self.cnpj),
            Cell::Date(self.data_referencia),
            Cell::from(&self.tipo_ativo),
            Cell::from(&self.subtipo_ativo),
            Cell::from(&self.emissor),
            Cell::from(&self.setor),
            Cell::from(&self.isin),
            Cell::Float(self.valor_mercado),
            Cell::Float(self.quantidade),
            Cell::from(self.fonte.as_str()),
        ]
    }
}

impl FundKeyed for CarteiraMensal {
    fn cnpj(&self) -> Option<&Cnpj> {
        self.cnpj.as_ref()
    }
}

/// One row of `fato_cotistas_mensal`.
#[derive(Clone, Debug, PartialEq)]
pub struct CotistasMensal {
    pub cnpj: Option<Cnpj>,
    pub data_referencia: Option<NaiveDate>,
    pub classe_cotistas: Option<String>,
    pub numero_cotistas: Option<i64>,
    pub patrimonio_liquido: Option<f64>,
    pub fonte: String,
}

impl Canonical for CotistasMensal {
    const COLUMN_MAP: &'static ColumnMap = &ColumnMap {
        table: "cotistas",
        fields: &[
            FieldSpec::required("cnpj", CNPJ_SOURCES),
            FieldSpec::required("data_referencia", &["DT_COMPTC"]),
            FieldSpec::optional("classe_cotistas", &["CLASSE_COTISTAS"]),
            FieldSpec::optional("numero_cotistas", &["QT_COTISTAS"]),
            FieldSpec::optional("patrimonio_liquido", &["VL_PATRIM_LIQ"]),
        ],
    };

    fn from_mapped(row: &MappedRow<'_>) -> Self {
        Self {
            cnpj: cnpj(row),
            data_referencia: date(row, "data_referencia"),
            classe_cotistas: text(row, "classe_cotistas"),
            numero_cotistas: count(row, "numero_cotistas"),
            patrimonio_liquido: decimal(row, "patrimonio_liquido"),
            fonte: FONTE_CVM.to_string(),
        }
    }
}

impl Record for CotistasMensal {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("cnpj", CellKind::Text),
            Column::new("data_referencia", CellKind::Date),
            Column::new("classe_cotistas", CellKind::Text),
            Column::new("numero_cotistas", CellKind::Int),
            Column::new("patrimonio_liquido", CellKind::Float),
            Column::new("fonte", CellKind::Text),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::from(&self.cnpj),
            Cell::Date(self.data_referencia),
            Cell::from(&self.classe_cotistas),
            Cell::Int(self.numero_cotistas),
            Cell::Float(self.patrimonio_liquido),
            Cell::from(self.fonte.as_str()),
        ]
    }
}

impl FundKeyed for CotistasMensal {
    fn cnpj(&self) -> Option<&Cnpj> {
        self.cnpj.as_ref()
    }
}
