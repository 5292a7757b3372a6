//! Diagnostics sink for the ingestion core.
//!
//! The parsers never log directly: they emit [`Event`]s into a sink passed by
//! the caller. [`TracingDiagnostics`] forwards to `tracing`, [`MemoryDiagnostics`]
//! keeps events for inspection.

use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Which part of a unit of work failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Download,
    Extract,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    ArchiveDownloaded {
        url: String,
    },
    DownloadFailed {
        url: String,
        reason: String,
    },
    TableParsed {
        family: &'static str,
        kind: &'static str,
        source: String,
        rows: usize,
    },
    TableFailed {
        family: &'static str,
        kind: &'static str,
        url: String,
        reason: String,
    },
    ColumnGap {
        kind: &'static str,
        source: String,
        missing: Vec<&'static str>,
    },
    FamilyFinished {
        family: &'static str,
        succeeded: usize,
        failed: usize,
    },
    InvalidMonitoredCnpj {
        value: String,
    },
}

pub trait Diagnostics: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards every event to `tracing` at a matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, event: Event) {
        match event {
            Event::ArchiveDownloaded { url } => debug!(%url, "downloaded"),
            Event::DownloadFailed { url, reason } => {
                error!(%url, %reason, "could not download")
            }
            Event::TableParsed {
                family,
                kind,
                source,
                rows,
            } => info!(family, kind, %source, rows, "parsed"),
            Event::TableFailed {
                family,
                kind,
                url,
                reason,
            } => warn!(family, kind, %url, %reason, "failed to load table"),
            Event::ColumnGap {
                kind,
                source,
                missing,
            } => warn!(kind, %source, ?missing, "source lacks columns"),
            Event::FamilyFinished {
                family,
                succeeded,
                failed,
            } => info!(family, succeeded, failed, "family finished"),
            Event::InvalidMonitoredCnpj { value } => {
                warn!(%value, "monitored fund has an invalid CNPJ, ignoring it")
            }
        }
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<Event>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn keeps_recording_after_a_panicking_holder() {
        let sink = Arc::new(MemoryDiagnostics::new());
        sink.emit(Event::ArchiveDownloaded { url: "a".into() });

        let poisoner = Arc::clone(&sink);
        let joined = thread::spawn(move || {
            let _guard = poisoner.events.lock().unwrap();
            panic!("holder dies with the lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(sink.events.is_poisoned());

        sink.emit(Event::ArchiveDownloaded { url: "b".into() });
        assert_eq!(
            sink.events(),
            vec![
                Event::ArchiveDownloaded { url: "a".into() },
                Event::ArchiveDownloaded { url: "b".into() },
            ]
        );
    }
}
