use std::collections::HashSet;

use crate::config::FundConfig;
use crate::diagnostics::{Diagnostics, Event};
use crate::process::normalize::{normalize_cnpj, Cnpj};
use crate::table::FundKeyed;

/// Identifiers of the monitored funds, normalized exactly like fact rows.
/// Config entries that do not normalize are reported and left out.
pub fn monitored_set(fundos: &[FundConfig], diagnostics: &dyn Diagnostics) -> HashSet<Cnpj> {
    fundos
        .iter()
        .filter_map(|f| {
            let cnpj = normalize_cnpj(&f.cnpj);
            if cnpj.is_none() {
                diagnostics.emit(Event::InvalidMonitoredCnpj {
                    value: f.cnpj.clone(),
                });
            }
            cnpj
        })
        .collect()
}

/// Keep rows whose identifier is monitored, in their original order.
/// Rows with an invalid identifier never match.
pub fn filter_monitored<R: FundKeyed>(rows: Vec<R>, monitored: &HashSet<Cnpj>) -> Vec<R> {
    if rows.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|r| r.cnpj().is_some_and(|c| monitored.contains(c)))
        .collect()
}
