//! End-to-end CVM run: month window, archive URLs, family parsers, fund
//! filter and dimensions, returned as one named collection.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::curated::{build_curated_tables, CuratedTable};
use crate::diagnostics::Diagnostics;
use crate::dimensions::{
    build_dim_categoria_cvm, build_dim_classe_anbima, build_dim_fundo, build_dim_gestora,
    DimFundo, DimValue,
};
use crate::error::PipelineError;
use crate::fetch::{build_monthly_urls, month_window, ArchiveSource, Downloader, Month};
use crate::filter::{filter_monitored, monitored_set};
use crate::process::b3::parse_b3;
use crate::process::collect::Failure;
use crate::process::inf_diario::{parse_inf_diario, DailyParse};
use crate::process::inf_mensal::{parse_inf_mensal, MonthlyParse};
use crate::process::records::{CarteiraMensal, CotaDiaria, CotistasMensal};
use crate::table::Table;

/// Names of the staging tables, in output order.
pub const STAGING_TABLES: [&str; 7] = [
    "fato_cota_diaria",
    "fato_carteira_mensal",
    "fato_cotistas_mensal",
    "dim_fundo",
    "dim_gestora",
    "dim_categoria_cvm",
    "dim_classe_anbima",
];

/// Fact and dimension tables of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct StagingTables {
    pub fato_cota_diaria: Vec<CotaDiaria>,
    pub fato_carteira_mensal: Vec<CarteiraMensal>,
    pub fato_cotistas_mensal: Vec<CotistasMensal>,
    pub dim_fundo: Vec<DimFundo>,
    pub dim_gestora: DimValue,
    pub dim_categoria_cvm: DimValue,
    pub dim_classe_anbima: DimValue,
}

impl StagingTables {
    /// The seven tables under their fixed names.
    pub fn named(&self) -> Vec<(&'static str, Table)> {
        let tables = [
            Table::from_records(&self.fato_cota_diaria),
            Table::from_records(&self.fato_carteira_mensal),
            Table::from_records(&self.fato_cotistas_mensal),
            Table::from_records(&self.dim_fundo),
            self.dim_gestora.table(),
            self.dim_categoria_cvm.table(),
            self.dim_classe_anbima.table(),
        ];
        STAGING_TABLES.into_iter().zip(tables).collect()
    }

    pub fn curated(&self) -> BTreeMap<&'static str, CuratedTable> {
        build_curated_tables(Some(&self.fato_cota_diaria), Some(&self.dim_fundo))
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub tables: StagingTables,
    /// Units of work skipped along the way, per family.
    pub failures: Vec<Failure>,
}

pub struct CvmPipeline {
    config: PipelineConfig,
    workdir: PathBuf,
}

impl CvmPipeline {
    pub fn new(config: PipelineConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workdir: workdir.into(),
        }
    }

    /// Months to fetch: `meses_retroativos` months ending
    /// `meses_ignorar_recente` months before `reference`.
    pub fn months(&self, reference: NaiveDate) -> Result<Vec<Month>, PipelineError> {
        let skip = u32::try_from(self.config.meses_ignorar_recente).map_err(|_| {
            PipelineError::Config(format!(
                "meses_ignorar_recente out of range: {}",
                self.config.meses_ignorar_recente
            ))
        })?;
        let end = Month::of(reference)
            .minus(skip)
            .first_day()
            .ok_or_else(|| PipelineError::Config(format!("no valid month before {}", reference)))?;
        month_window(end, self.config.meses_retroativos)
    }

    fn daily_sources(&self) -> Vec<ArchiveSource> {
        let mut sources = Vec::new();
        if self.config.datasets.inf_diario {
            sources.push(ArchiveSource::InfDiarioFi);
        }
        if self.config.datasets.inf_diario_fim {
            sources.push(ArchiveSource::InfDiarioFim);
        }
        sources
    }

    /// Run every enabled family for the window ending at `reference`.
    ///
    /// Disabled families contribute empty fact tables. A family where nothing
    /// could be read aborts the run. B3 spreadsheets, when enabled, are
    /// appended to the daily facts and never abort it.
    pub async fn run<D: Downloader>(
        &self,
        downloader: &D,
        reference: NaiveDate,
        diagnostics: &dyn Diagnostics,
    ) -> Result<PipelineOutput, PipelineError> {
        self.config.validate()?;

        // 1) Month window + URLs
        let months = self.months(reference)?;
        let daily_sources = self.daily_sources();
        let daily_urls = build_monthly_urls(&daily_sources, &months);
        let monthly_urls = if self.config.datasets.inf_mensal {
            build_monthly_urls(&[ArchiveSource::InfMensalFi], &months)
        } else {
            Vec::new()
        };

        // 2) Parse each family
        let mut failures = Vec::new();
        let daily = if daily_urls.is_empty() {
            DailyParse::default()
        } else {
            parse_inf_diario(downloader, &daily_urls, &self.workdir, diagnostics).await?
        };
        failures.extend(daily.failures);

        let monthly = if monthly_urls.is_empty() {
            MonthlyParse::default()
        } else {
            parse_inf_mensal(downloader, &monthly_urls, &self.workdir, diagnostics).await?
        };
        failures.extend(monthly.failures);

        // 3) B3 spreadsheets join the daily facts
        let mut cotas = daily.cotas;
        if self.config.enable_b3_ingestion && !self.config.b3_planilhas.is_empty() {
            let b3 = parse_b3(
                downloader,
                &self.config.b3_planilhas,
                &self.workdir,
                diagnostics,
            )
            .await?;
            cotas.extend(b3.cotas);
            failures.extend(b3.failures);
        }

        // 4) Keep monitored funds only
        let monitored = monitored_set(&self.config.fundos, diagnostics);
        let fato_cota_diaria = filter_monitored(cotas, &monitored);
        let fato_carteira_mensal = filter_monitored(monthly.carteira, &monitored);
        let fato_cotistas_mensal = filter_monitored(monthly.cotistas, &monitored);

        // 5) Dimensions
        let tables = StagingTables {
            fato_cota_diaria,
            fato_carteira_mensal,
            fato_cotistas_mensal,
            dim_fundo: build_dim_fundo(&self.config),
            dim_gestora: build_dim_gestora(&self.config),
            dim_categoria_cvm: build_dim_categoria_cvm(&self.config),
            dim_classe_anbima: build_dim_classe_anbima(&self.config),
        };

        Ok(PipelineOutput { tables, failures })
    }
}
