use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use cvmscraper::{
    config::{load_config, PipelineConfig},
    diagnostics::TracingDiagnostics,
    fetch::HttpDownloader,
    output::{frontend::export_frontend_payload, save_tables, OutputFormat},
    pipeline::{CvmPipeline, StagingTables},
    table::Table,
    warehouse::{upload_tables, BigQueryUploader, Destination},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const MAIS_RETORNO_TERMS_URL: &str = "https://www.maisretorno.com/termos";

#[derive(Parser)]
#[command(
    name = "cvmscraper",
    about = "CVM fund disclosure ingestion: download, normalize, export and load"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full run: download, clean, save and upload to BigQuery.
    Ingest {
        /// YAML configuration file.
        #[arg(long, default_value = "config/pipeline.yaml")]
        config: PathBuf,

        /// Scratch directory for downloaded archives.
        #[arg(long, default_value = ".tmp_pipeline")]
        workdir: PathBuf,

        /// Where the staging/ and curated/ tables are written.
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        /// Keep the files local.
        #[arg(long, default_value_t = false)]
        skip_bigquery: bool,

        /// csv or parquet.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// Also write the frontend JSON payload here.
        #[arg(long)]
        frontend_dir: Option<PathBuf>,

        /// Reference date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        reference: Option<NaiveDate>,
    },
    /// Run the pipeline and keep the tables local.
    ExportLocal {
        #[arg(long, default_value = "config/pipeline.yaml")]
        config: PathBuf,

        #[arg(long, default_value = ".tmp_pipeline")]
        workdir: PathBuf,

        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        #[arg(long)]
        frontend_dir: Option<PathBuf>,

        #[arg(long)]
        reference: Option<NaiveDate>,
    },
    /// Upload CSVs already present in the output directory.
    UploadBigquery {
        #[arg(long, default_value = "config/pipeline.yaml")]
        config: PathBuf,

        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 0) .env overrides (BIGQUERY_*, GCS_BUCKET, PIPELINE_LOG_LEVEL) ──
    dotenvy::dotenv().ok();

    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_env("PIPELINE_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    // ─── 2) dispatch ─────────────────────────────────────────────────
    match Cli::parse().command {
        Commands::Ingest {
            config,
            workdir,
            output_dir,
            skip_bigquery,
            format,
            frontend_dir,
            reference,
        } => {
            let cfg = load_config(&config)?;
            if !skip_bigquery && format != OutputFormat::Csv {
                bail!("BigQuery upload needs --format csv (or pass --skip-bigquery)");
            }
            // fail on incomplete warehouse settings before downloading anything
            let uploader = if skip_bigquery {
                None
            } else {
                Some(BigQueryUploader::from_config(&cfg)?)
            };

            info!("starting full ingestion");
            let tables = collect(&cfg, &workdir, reference).await?;
            let (staging, curated) = save_all(&tables, &output_dir, format)?;
            if let Some(dir) = frontend_dir {
                export_frontend_payload(&cfg, &tables, &dir)?;
            }

            if let Some(uploader) = uploader {
                upload_tables(&uploader, &staging, Destination::Staging).await?;
                upload_tables(&uploader, &curated, Destination::Curated).await?;
            }
            info!("ingestion finished");
        }

        Commands::ExportLocal {
            config,
            workdir,
            output_dir,
            format,
            frontend_dir,
            reference,
        } => {
            let cfg = load_config(&config)?;
            let tables = collect(&cfg, &workdir, reference).await?;
            let (staging, curated) = save_all(&tables, &output_dir, format)?;
            if let Some(dir) = frontend_dir {
                export_frontend_payload(&cfg, &tables, &dir)?;
            }
            let summary = serde_json::json!({
                "staging": staging.values().collect::<Vec<_>>(),
                "curated": curated.values().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::UploadBigquery { config, output_dir } => {
            let cfg = load_config(&config)?;
            let uploader = BigQueryUploader::from_config(&cfg)?;

            let staging = csv_files(&output_dir.join("staging"))?;
            let curated = csv_files(&output_dir.join("curated"))?;
            if staging.is_empty() && curated.is_empty() {
                bail!(
                    "no CSV found under {}; run export-local or ingest first",
                    output_dir.display()
                );
            }

            upload_tables(&uploader, &staging, Destination::Staging).await?;
            upload_tables(&uploader, &curated, Destination::Curated).await?;
            info!("upload finished");
        }
    }

    Ok(())
}

/// Run the CVM pipeline with the HTTP downloader.
async fn collect(
    cfg: &PipelineConfig,
    workdir: &Path,
    reference: Option<NaiveDate>,
) -> Result<StagingTables> {
    let reference = reference.unwrap_or_else(|| Local::now().date_naive());
    info!(
        months = cfg.meses_retroativos,
        skip_recent = cfg.meses_ignorar_recente,
        %reference,
        "collecting CVM datasets"
    );
    for fund in cfg.list_monitorados() {
        debug!(%fund, "monitored");
    }

    let downloader = HttpDownloader::new().context("building HTTP client")?;
    let out = CvmPipeline::new(cfg.clone(), workdir)
        .run(&downloader, reference, &TracingDiagnostics)
        .await?;

    if !out.failures.is_empty() {
        warn!(count = out.failures.len(), "some archives or tables were skipped");
        for f in &out.failures {
            debug!(family = f.family, url = %f.url, kind = ?f.kind, stage = ?f.stage, reason = %f.reason, "skipped");
        }
    }

    if cfg.enable_mais_retorno_fallback {
        warn!(
            terms = MAIS_RETORNO_TERMS_URL,
            "Mais Retorno scraping must follow its terms of use; check permission before any manual collection"
        );
    }

    Ok(out.tables)
}

type SavedPaths = BTreeMap<String, PathBuf>;

/// Staging tables to `<out>/staging`, curated tables to `<out>/curated`.
fn save_all(
    tables: &StagingTables,
    output_dir: &Path,
    format: OutputFormat,
) -> Result<(SavedPaths, SavedPaths)> {
    let named = tables.named();
    let staging = save_tables(
        named.iter().map(|(name, t)| (*name, t)),
        &output_dir.join("staging"),
        format,
    )?;

    let curated_tables: Vec<(&str, Table)> = tables
        .curated()
        .iter()
        .map(|(name, c)| (*name, c.table()))
        .collect();
    let curated = save_tables(
        curated_tables.iter().map(|(name, t)| (*name, t)),
        &output_dir.join("curated"),
        format,
    )?;
    Ok((staging, curated))
}

/// `<dir>/*.csv` keyed by file stem.
fn csv_files(dir: &Path) -> Result<SavedPaths> {
    let pattern = dir.join("*.csv");
    let pattern = pattern
        .to_str()
        .with_context(|| format!("non UTF-8 path {}", dir.display()))?;
    let mut files = BTreeMap::new();
    for entry in glob::glob(pattern).context("invalid glob pattern")? {
        let path = entry.context("reading directory entry")?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.insert(stem.to_string(), path.clone());
        }
    }
    Ok(files)
}
