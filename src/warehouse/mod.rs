// src/warehouse/mod.rs
//! Loads local CSV tables into BigQuery through the REST API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, time::sleep};
use tracing::{debug, info};

use crate::config::{PipelineConfig, WarehouseSettings};
use crate::error::{PipelineError, UploadError};

const API_BASE: &str = "https://bigquery.googleapis.com";
const TOKEN_ENV: &str = "BIGQUERY_ACCESS_TOKEN";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: usize = 900;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const BOUNDARY: &str = "cvmscraper_load_boundary";

/// Which dataset a table lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    Staging,
    Curated,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Staging => f.write_str("staging"),
            Destination::Curated => f.write_str("curated"),
        }
    }
}

/// Accepts a local CSV file for a named table.
pub trait Uploader {
    fn load_csv(
        &self,
        path: &Path,
        table: &str,
        destination: Destination,
    ) -> impl Future<Output = Result<(), UploadError>> + Send;
}

/// Upload every `name → path` pair, stopping at the first failure.
pub async fn upload_tables<U: Uploader>(
    uploader: &U,
    paths: &BTreeMap<String, PathBuf>,
    destination: Destination,
) -> Result<(), UploadError> {
    for (name, path) in paths {
        uploader.load_csv(path, name, destination).await?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfig<'a> {
    destination_table: TableReference<'a>,
    source_format: &'static str,
    autodetect: bool,
    skip_leading_rows: u32,
    write_disposition: &'static str,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobLocation<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadJob<'a> {
    configuration: JobConfiguration<'a>,
    job_reference: JobLocation<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    status: JobStatus,
}

/// BigQuery load jobs over `reqwest`. Authentication is external: a bearer
/// token is read from `BIGQUERY_ACCESS_TOKEN`.
#[derive(Clone)]
pub struct BigQueryUploader {
    client: Client,
    settings: WarehouseSettings,
    token: String,
    api_base: String,
}

impl fmt::Debug for BigQueryUploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryUploader")
            .field("settings", &self.settings)
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl BigQueryUploader {
    pub fn new(settings: WarehouseSettings, token: String) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            settings,
            token,
            api_base: API_BASE.to_string(),
        })
    }

    /// Warehouse settings from `config`, token from the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let settings = config.warehouse()?;
        let token = env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::Config(format!("{} is not set", TOKEN_ENV)))?;
        Self::new(settings, token)
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))
    }

    pub fn dataset_for(&self, destination: Destination) -> &str {
        match destination {
            Destination::Staging => &self.settings.staging_dataset,
            Destination::Curated => &self.settings.curated_dataset,
        }
    }

    pub fn table_id(&self, table: &str, destination: Destination) -> String {
        format!(
            "{}.{}.{}",
            self.settings.project,
            self.dataset_for(destination),
            table
        )
    }

    fn job_json(&self, table: &str, destination: Destination) -> serde_json::Result<String> {
        serde_json::to_string(&LoadJob {
            configuration: JobConfiguration {
                load: LoadConfig {
                    destination_table: TableReference {
                        project_id: &self.settings.project,
                        dataset_id: self.dataset_for(destination),
                        table_id: table,
                    },
                    source_format: "CSV",
                    autodetect: true,
                    skip_leading_rows: 1,
                    write_disposition: "WRITE_TRUNCATE",
                },
            },
            job_reference: JobLocation {
                location: self.settings.location.as_deref(),
            },
        })
    }

    async fn check(resp: reqwest::Response) -> Result<JobResource, UploadError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<JobResource>().await?)
    }

    async fn wait_for(&self, mut job: JobResource) -> Result<(), UploadError> {
        let mut polls = 0;
        while job.status.state != "DONE" {
            if polls >= MAX_POLLS {
                return Err(UploadError::Job {
                    job_id: job.job_reference.job_id,
                    message: "timed out waiting for completion".into(),
                });
            }
            polls += 1;
            sleep(POLL_INTERVAL).await;

            let url = format!(
                "{}/bigquery/v2/projects/{}/jobs/{}",
                self.api_base, self.settings.project, job.job_reference.job_id
            );
            let mut req = self.client.get(&url).bearer_auth(&self.token);
            if let Some(location) = &job.job_reference.location {
                req = req.query(&[("location", location)]);
            }
            job = Self::check(req.send().await?).await?;
            debug!(job_id = %job.job_reference.job_id, state = %job.status.state, "polled load job");
        }
        match job.status.error_result {
            Some(err) => Err(UploadError::Job {
                job_id: job.job_reference.job_id,
                message: err.message,
            }),
            None => Ok(()),
        }
    }
}

/// `multipart/related` body: job metadata first, then the file.
fn multipart_body(metadata: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = BOUNDARY,
            m = metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

impl Uploader for BigQueryUploader {
    async fn load_csv(
        &self,
        path: &Path,
        table: &str,
        destination: Destination,
    ) -> Result<(), UploadError> {
        let table_id = self.table_id(table, destination);
        info!(path = %path.display(), %table_id, "uploading CSV");

        let data = fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = self.job_json(table, destination).map_err(|e| UploadError::Job {
            job_id: table_id.clone(),
            message: e.to_string(),
        })?;

        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.api_base, self.settings.project
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(multipart_body(&metadata, &data))
            .send()
            .await?;
        let job = Self::check(resp).await?;
        self.wait_for(job).await?;

        info!(%table_id, "load job done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;

    fn uploader(location: Option<&str>) -> BigQueryUploader {
        BigQueryUploader::new(
            WarehouseSettings {
                project: "proj".into(),
                staging_dataset: "stg".into(),
                curated_dataset: "cur".into(),
                location: location.map(str::to_string),
            },
            "token".into(),
        )
        .unwrap()
    }

    #[test]
    fn destination_selects_dataset() {
        let up = uploader(None);
        assert_eq!(up.dataset_for(Destination::Staging), "stg");
        assert_eq!(up.dataset_for(Destination::Curated), "cur");
        assert_eq!(
            up.table_id("dim_fundo", Destination::Staging),
            "proj.stg.dim_fundo"
        );
    }

    #[test]
    fn debug_output_hides_the_token() {
        let shown = format!("{:?}", uploader(None));
        assert!(shown.contains("proj"));
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("\"token\""));
    }

    #[test]
    fn job_truncates_and_skips_header() {
        let json: Value =
            serde_json::from_str(&uploader(Some("US")).job_json("t", Destination::Curated).unwrap())
                .unwrap();
        let load = &json["configuration"]["load"];
        assert_eq!(load["destinationTable"]["datasetId"], "cur");
        assert_eq!(load["destinationTable"]["tableId"], "t");
        assert_eq!(load["writeDisposition"], "WRITE_TRUNCATE");
        assert_eq!(load["sourceFormat"], "CSV");
        assert_eq!(load["skipLeadingRows"], 1);
        assert_eq!(load["autodetect"], true);
        assert_eq!(json["jobReference"]["location"], "US");

        let json: Value =
            serde_json::from_str(&uploader(None).job_json("t", Destination::Staging).unwrap())
                .unwrap();
        assert!(json["jobReference"].get("location").is_none());
    }

    #[test]
    fn multipart_body_wraps_both_parts() {
        let body = multipart_body("{}", b"a,b\n1,2\n");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{}\r\n", BOUNDARY)));
        assert!(text.contains("application/json; charset=UTF-8\r\n\r\n{}\r\n"));
        assert!(text.contains("application/octet-stream\r\n\r\na,b\n1,2\n\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", BOUNDARY)));
    }

    #[test]
    fn incomplete_settings_are_config_errors() {
        let err = BigQueryUploader::from_config(&PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn job_resource_parses_error_result() {
        let job: JobResource = serde_json::from_str(
            r#"{"jobReference":{"jobId":"j1","location":"US"},
                "status":{"state":"DONE","errorResult":{"reason":"invalid","message":"bad row"}}}"#,
        )
        .unwrap();
        assert_eq!(job.job_reference.job_id, "j1");
        assert_eq!(job.status.error_result.unwrap().message, "bad row");
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Destination)>>,
    }

    impl Uploader for Recorder {
        async fn load_csv(
            &self,
            _path: &Path,
            table: &str,
            destination: Destination,
        ) -> Result<(), UploadError> {
            self.calls
                .lock()
                .unwrap()
                .push((table.to_string(), destination));
            Ok(())
        }
    }

    #[tokio::test]
    async fn upload_tables_visits_every_path_in_name_order() {
        let recorder = Recorder::default();
        let paths: BTreeMap<String, PathBuf> = [
            ("fato_cota_diaria".to_string(), PathBuf::from("b.csv")),
            ("dim_fundo".to_string(), PathBuf::from("a.csv")),
        ]
        .into_iter()
        .collect();
        upload_tables(&recorder, &paths, Destination::Curated)
            .await
            .unwrap();
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("dim_fundo".to_string(), Destination::Curated),
                ("fato_cota_diaria".to_string(), Destination::Curated),
            ]
        );
    }
}
