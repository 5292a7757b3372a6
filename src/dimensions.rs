//! Reference tables derived from the static configuration.

use std::collections::BTreeSet;

use crate::config::PipelineConfig;
use crate::process::normalize::{normalize_cnpj, Cnpj};
use crate::table::{Cell, CellKind, Column, Record};

#[derive(Clone, Debug, PartialEq)]
pub struct DimFundo {
    pub cnpj: Option<Cnpj>,
    pub nome: String,
    pub categoria_cvm: Option<String>,
    pub gestora: Option<String>,
    pub classe_anbima: Option<String>,
    pub grupo_looker: Option<String>,
}

impl Record for DimFundo {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("cnpj", CellKind::Text),
            Column::new("nome", CellKind::Text),
            Column::new("categoria_cvm", CellKind::Text),
            Column::new("gestora", CellKind::Text),
            Column::new("classe_anbima", CellKind::Text),
            Column::new("grupo_looker", CellKind::Text),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::from(&self.cnpj),
            Cell::from(self.nome.as_str()),
            Cell::from(&self.categoria_cvm),
            Cell::from(&self.gestora),
            Cell::from(&self.classe_anbima),
            Cell::from(&self.grupo_looker),
        ]
    }
}

/// Single-column lookup (`dim_gestora`, `dim_categoria_cvm`, `dim_classe_anbima`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimValue {
    pub column: &'static str,
    pub values: Vec<String>,
}

impl DimValue {
    pub fn table(&self) -> crate::table::Table {
        crate::table::Table {
            columns: vec![Column::new(self.column, CellKind::Text)],
            rows: self
                .values
                .iter()
                .map(|v| vec![Cell::from(v.as_str())])
                .collect(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn distinct<'a>(column: &'static str, values: impl Iterator<Item = &'a str>) -> DimValue {
    let set: BTreeSet<String> = values.filter_map(non_empty).collect();
    DimValue {
        column,
        values: set.into_iter().collect(),
    }
}

/// One row per configured fund, identifiers normalized for joining.
///
/// A fund without its own `grupo_looker` takes the group mapped to its CVM
/// category in `categorias_looker`.
pub fn build_dim_fundo(config: &PipelineConfig) -> Vec<DimFundo> {
    config
        .fundos
        .iter()
        .map(|f| DimFundo {
            cnpj: normalize_cnpj(&f.cnpj),
            nome: f.nome.clone(),
            categoria_cvm: non_empty(&f.categoria_cvm),
            gestora: non_empty(&f.gestora),
            classe_anbima: f.classe_anbima.as_deref().and_then(non_empty),
            grupo_looker: f
                .grupo_looker
                .as_deref()
                .and_then(non_empty)
                .or_else(|| {
                    config
                        .categorias_looker
                        .get(f.categoria_cvm.trim())
                        .map(String::as_str)
                        .and_then(non_empty)
                }),
        })
        .collect()
}

pub fn build_dim_gestora(config: &PipelineConfig) -> DimValue {
    distinct("gestora", config.fundos.iter().map(|f| f.gestora.as_str()))
}

pub fn build_dim_categoria_cvm(config: &PipelineConfig) -> DimValue {
    distinct(
        "categoria_cvm",
        config.fundos.iter().map(|f| f.categoria_cvm.as_str()),
    )
}

pub fn build_dim_classe_anbima(config: &PipelineConfig) -> DimValue {
    distinct(
        "classe_anbima",
        config
            .fundos
            .iter()
            .filter_map(|f| f.classe_anbima.as_deref()),
    )
}
