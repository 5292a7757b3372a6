//! Pipeline configuration, read once per run from YAML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::path::Path;

use crate::error::PipelineError;
use crate::fetch::MAX_WINDOW_MONTHS;

/// A monitored fund and its descriptive attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundConfig {
    pub cnpj: String,
    pub nome: String,
    pub categoria_cvm: String,
    pub gestora: String,
    #[serde(default)]
    pub classe_anbima: Option<String>,
    #[serde(default)]
    pub grupo_looker: Option<String>,
}

/// Per-family switches. A disabled family produces empty fact tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetToggles {
    pub inf_diario: bool,
    /// Also read daily archives from the legacy FIM base path.
    pub inf_diario_fim: bool,
    pub inf_mensal: bool,
}

impl Default for DatasetToggles {
    fn default() -> Self {
        Self {
            inf_diario: true,
            inf_diario_fim: true,
            inf_mensal: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub meses_retroativos: i64,
    /// Skip this many of the most recent months (CVM publishes with a lag).
    pub meses_ignorar_recente: i64,
    pub fundos: Vec<FundConfig>,
    pub categorias_looker: BTreeMap<String, String>,
    pub bigquery_project: Option<String>,
    pub bigquery_dataset_staging: Option<String>,
    pub bigquery_dataset_curated: Option<String>,
    pub bigquery_location: Option<String>,
    pub gcs_bucket: Option<String>,
    pub datasets: DatasetToggles,
    /// Merge B3 quota spreadsheets into the daily facts.
    pub enable_b3_ingestion: bool,
    /// Spreadsheet URLs (`.xlsx`, `.xls`, `.ods` or `;` CSV).
    pub b3_planilhas: Vec<String>,
    pub enable_mais_retorno_fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            meses_retroativos: 24,
            meses_ignorar_recente: 0,
            fundos: Vec::new(),
            categorias_looker: BTreeMap::new(),
            bigquery_project: None,
            bigquery_dataset_staging: None,
            bigquery_dataset_curated: None,
            bigquery_location: None,
            gcs_bucket: None,
            datasets: DatasetToggles::default(),
            enable_b3_ingestion: false,
            b3_planilhas: Vec::new(),
            enable_mais_retorno_fallback: false,
        }
    }
}

/// Warehouse coordinates, present only when all required settings are.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarehouseSettings {
    pub project: String,
    pub staging_dataset: String,
    pub curated_dataset: String,
    pub location: Option<String>,
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        let cfg: Self = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("invalid YAML: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=MAX_WINDOW_MONTHS).contains(&self.meses_retroativos) {
            return Err(PipelineError::Config(format!(
                "meses_retroativos must be between 1 and {}, got {}",
                MAX_WINDOW_MONTHS, self.meses_retroativos
            )));
        }
        if !(0..=MAX_WINDOW_MONTHS).contains(&self.meses_ignorar_recente) {
            return Err(PipelineError::Config(format!(
                "meses_ignorar_recente must be between 0 and {}, got {}",
                MAX_WINDOW_MONTHS, self.meses_ignorar_recente
            )));
        }
        Ok(())
    }

    /// Replace warehouse settings with any of `BIGQUERY_PROJECT`,
    /// `BIGQUERY_DATASET_STAGING`, `BIGQUERY_DATASET_CURATED`, `GCS_BUCKET`
    /// found through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut Option<String>); 4] = [
            ("BIGQUERY_PROJECT", &mut self.bigquery_project),
            ("BIGQUERY_DATASET_STAGING", &mut self.bigquery_dataset_staging),
            ("BIGQUERY_DATASET_CURATED", &mut self.bigquery_dataset_curated),
            ("GCS_BUCKET", &mut self.gcs_bucket),
        ];
        for (key, slot) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
    }

    pub fn warehouse(&self) -> Result<WarehouseSettings, PipelineError> {
        match (
            &self.bigquery_project,
            &self.bigquery_dataset_staging,
            &self.bigquery_dataset_curated,
        ) {
            (Some(project), Some(staging), Some(curated)) => Ok(WarehouseSettings {
                project: project.clone(),
                staging_dataset: staging.clone(),
                curated_dataset: curated.clone(),
                location: self.bigquery_location.clone(),
            }),
            _ => Err(PipelineError::Config(
                "incomplete BigQuery settings: bigquery_project, bigquery_dataset_staging and \
                 bigquery_dataset_curated are required"
                    .into(),
            )),
        }
    }

    /// "nome (cnpj)" for each monitored fund.
    pub fn list_monitorados(&self) -> impl Iterator<Item = String> + '_ {
        self.fundos
            .iter()
            .map(|f| format!("{} ({})", f.nome, f.cnpj))
    }
}

/// Load `path` and apply the process environment overrides.
pub fn load_config(path: &Path) -> Result<PipelineConfig, PipelineError> {
    let file = File::open(path).map_err(|e| {
        PipelineError::Config(format!("configuration file {} not readable: {}", path.display(), e))
    })?;
    let mut cfg: PipelineConfig = serde_yaml::from_reader(file)
        .map_err(|e| PipelineError::Config(format!("invalid YAML in {}: {}", path.display(), e)))?;
    cfg.validate()?;
    cfg.apply_overrides(|key| env::var(key).ok());
    Ok(cfg)
}
