//! Parser for the CVM monthly report archives (`inf_mensal_fi_*`), which carry
//! the portfolio and shareholder tables side by side.

use std::path::Path;

use crate::diagnostics::{Diagnostics, Event};
use crate::error::PipelineError;
use crate::fetch::Downloader;
use crate::process::collect::{for_each_archive, staging_dir, Failure, KindAccumulator};
use crate::process::records::{CarteiraMensal, CotistasMensal};

pub const FAMILY: &str = "inf_mensal";

#[derive(Debug, Default)]
pub struct MonthlyParse {
    pub carteira: Vec<CarteiraMensal>,
    pub cotistas: Vec<CotistasMensal>,
    pub failures: Vec<Failure>,
}

/// Download every monthly archive and read both table kinds from each.
///
/// A kind missing from one archive only loses that kind for that month. Fails
/// when neither kind could be read from any archive.
pub async fn parse_inf_mensal<D: Downloader>(
    downloader: &D,
    urls: &[String],
    workdir: &Path,
    diagnostics: &dyn Diagnostics,
) -> Result<MonthlyParse, PipelineError> {
    let staging = staging_dir(workdir, FAMILY)?;
    let mut failures = Vec::new();
    let mut carteira = KindAccumulator::<CarteiraMensal>::new(FAMILY, "carteira", "carteira");
    let mut cotistas = KindAccumulator::<CotistasMensal>::new(FAMILY, "cotistas", "cotist");

    for_each_archive(
        downloader,
        urls,
        &staging,
        FAMILY,
        diagnostics,
        &mut failures,
        |url, zip_path, failures| {
            carteira.absorb(url, zip_path, diagnostics, failures);
            cotistas.absorb(url, zip_path, diagnostics, failures);
        },
    )
    .await;

    let succeeded = carteira.succeeded() + cotistas.succeeded();
    diagnostics.emit(Event::FamilyFinished {
        family: FAMILY,
        succeeded,
        failed: failures.len(),
    });
    if succeeded == 0 {
        return Err(PipelineError::TotalFailure { family: FAMILY });
    }

    Ok(MonthlyParse {
        carteira: carteira.concat(),
        cotistas: cotistas.concat(),
        failures,
    })
}
