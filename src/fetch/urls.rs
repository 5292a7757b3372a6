// src/fetch/urls.rs
use chrono::{Datelike, NaiveDate};
use std::fmt;

use crate::error::PipelineError;

static BASE_URL_FI_DIARIO: &str = "https://dados.cvm.gov.br/dados/FI/DOC/INF_DIARIO/DADOS";
static BASE_URL_FIM_DIARIO: &str = "https://dados.cvm.gov.br/dados/FIM/DOC/INF_DIARIO/DADOS";
static BASE_URL_FI_MENSAL: &str = "https://dados.cvm.gov.br/dados/FI/DOC/INF_MENSAL/DADOS";

/// A calendar month. The day is implicitly the 1st.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Returns `None` when `month` is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month immediately before this one, wrapping January → December.
    pub fn pred(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Walk `n` months back.
    pub fn minus(self, n: u32) -> Self {
        let index = i64::from(self.year) * 12 + i64::from(self.month) - 1 - i64::from(n);
        // |index| / 12 stays well inside i32 for any u32 `n`
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// `YYYYMM`, the token CVM embeds in archive file names.
    pub fn token(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Upper bound for any month count read from configuration (a century).
pub const MAX_WINDOW_MONTHS: i64 = 1200;

/// `months_back` months ending at the month of `reference`, most recent first.
pub fn month_window(reference: NaiveDate, months_back: i64) -> Result<Vec<Month>, PipelineError> {
    if !(1..=MAX_WINDOW_MONTHS).contains(&months_back) {
        return Err(PipelineError::Config(format!(
            "months_back must be between 1 and {}, got {}",
            MAX_WINDOW_MONTHS, months_back
        )));
    }
    let mut months = Vec::with_capacity(months_back as usize);
    let mut current = Month::of(reference);
    for _ in 0..months_back {
        months.push(current);
        current = current.pred();
    }
    Ok(months)
}

/// The remote archive series published by CVM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveSource {
    /// Daily quota reports of FI funds
    InfDiarioFi,
    /// Daily quota reports of the legacy FIM base path
    InfDiarioFim,
    /// Monthly reports (portfolio + shareholders)
    InfMensalFi,
}

impl ArchiveSource {
    /// Deterministic archive URL for `month`; distinct months give distinct URLs.
    pub fn url_for(&self, month: Month) -> String {
        let ym = month.token();
        match self {
            ArchiveSource::InfDiarioFi => format!("{}/inf_diario_fi_{}.zip", BASE_URL_FI_DIARIO, ym),
            ArchiveSource::InfDiarioFim => {
                format!("{}/inf_diario_fim_{}.zip", BASE_URL_FIM_DIARIO, ym)
            }
            ArchiveSource::InfMensalFi => format!("{}/inf_mensal_fi_{}.zip", BASE_URL_FI_MENSAL, ym),
        }
    }
}

/// One URL per source per month, keeping the month order of `months`.
pub fn build_monthly_urls(sources: &[ArchiveSource], months: &[Month]) -> Vec<String> {
    months
        .iter()
        .flat_map(|&m| sources.iter().map(move |s| s.url_for(m)))
        .collect()
}
