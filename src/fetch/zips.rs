use reqwest::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, time::sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::DownloadError;

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches a remote archive into a local file.
///
/// The pipeline treats every `Err` as a per-URL miss and moves on; retry and
/// timeout policy belong to the implementation.
pub trait Downloader {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<PathBuf, DownloadError>> + Send;
}

/// Last path segment of `url`, used as the staged file name.
pub fn archive_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download.zip".to_string())
}

/// `reqwest`-backed downloader with a small retry loop.
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let failure = match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(bytes) => return Ok(bytes.to_vec()),
                    Err(e) => DownloadError::Request {
                        url: url.to_string(),
                        reason: e.to_string(),
                    },
                },
                Ok(resp) => DownloadError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                },
                Err(e) => DownloadError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                },
            };

            let status = match &failure {
                DownloadError::Status { status, .. } => Some(*status),
                _ => None,
            };
            match next_step(status, attempt) {
                NextStep::Retry => {
                    warn!(url, attempt, "download attempt failed, retrying");
                    sleep(RETRY_DELAY).await;
                }
                NextStep::GiveUp => return Err(failure),
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum NextStep {
    Retry,
    GiveUp,
}

/// Decide what follows a failed attempt. `status` is `None` for transport
/// errors (connect, timeout, truncated body).
fn next_step(status: Option<u16>, attempt: usize) -> NextStep {
    match status {
        // 4xx is the normal answer for months CVM has not published yet
        Some(code) if (400..500).contains(&code) => NextStep::GiveUp,
        _ if attempt < MAX_RETRIES => NextStep::Retry,
        _ => NextStep::GiveUp,
    }
}

impl Downloader for HttpDownloader {
    /// Download `url` and save it at `dest`, creating parent directories.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, DownloadError> {
        info!(url, "downloading");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let bytes = self.get_bytes(url).await?;
        fs::write(dest, &bytes)
            .await
            .map_err(|source| DownloadError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
        debug!(path = %dest.display(), size = bytes.len(), "saved download");
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(
            archive_file_name(
                "https://dados.cvm.gov.br/dados/FI/DOC/INF_MENSAL/DADOS/inf_mensal_fi_202401.zip"
            ),
            "inf_mensal_fi_202401.zip"
        );
    }

    #[test]
    fn file_name_falls_back_for_directory_urls() {
        assert_eq!(archive_file_name("https://example.com/"), "download.zip");
        assert_eq!(archive_file_name("not a url"), "download.zip");
    }

    #[test]
    fn client_errors_are_not_retried() {
        assert_eq!(next_step(Some(404), 1), NextStep::GiveUp);
        assert_eq!(next_step(Some(403), 1), NextStep::GiveUp);
    }

    #[test]
    fn server_and_transport_errors_retry_until_exhausted() {
        assert_eq!(next_step(Some(500), 1), NextStep::Retry);
        assert_eq!(next_step(Some(503), MAX_RETRIES - 1), NextStep::Retry);
        assert_eq!(next_step(Some(500), MAX_RETRIES), NextStep::GiveUp);
        assert_eq!(next_step(None, 1), NextStep::Retry);
        assert_eq!(next_step(None, MAX_RETRIES), NextStep::GiveUp);
    }

    #[test]
    fn redirects_left_unfollowed_count_as_failures() {
        assert_eq!(next_step(Some(302), 1), NextStep::Retry);
        assert_eq!(next_step(Some(302), MAX_RETRIES), NextStep::GiveUp);
    }
}
