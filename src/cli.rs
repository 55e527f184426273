use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde_json::json;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::analysis::changed_packages::changed_packages;
use crate::analysis::window::Window;
use crate::analysis::Monitor;
use crate::auth::Token;
use crate::config::{Config, OutputFormat};
use crate::dashboard::MonitorPayload;
use crate::error::SquashError;
use crate::models::{JobId, Metric, NewJob};
use crate::output::{self, export_payload, print_summary, write_json};
use crate::providers::{DashboardSource, SqliteStore, SquashClient};

#[derive(Parser)]
#[command(name = "squash")]
#[command(author, version, about = "Science Quality Analysis Harness", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./squash.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,
}

/// Where measurements come from. `--db` wins over an API URL.
#[derive(Args, Debug, Clone, Default)]
struct SourceArgs {
    /// Local SQLite store
    #[arg(long)]
    db: Option<PathBuf>,

    /// SQUASH API root
    #[arg(short, long, env = "SQUASH_API_URL")]
    url: Option<String>,

    /// Bearer token for the API
    #[arg(short, long, env = "SQUASH_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Metric history, changed packages and CI gaps for one dataset
    Monitor {
        #[arg(short, long)]
        dataset: Option<String>,

        #[arg(short, long)]
        metric: Option<String>,

        /// weeks, months, years or all
        #[arg(short, long)]
        window: Option<String>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Submit a job (JSON) with its packages and measurements
    Submit {
        file: PathBuf,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Register or update metric definitions (JSON array) in the local store
    LoadMetrics {
        file: PathBuf,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Packages a stored job changed since its previous comparable job
    Changes {
        #[arg(short, long)]
        job: JobId,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Delete a stored job with its packages and measurements
    Delete {
        #[arg(short, long)]
        job: JobId,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List stored jobs of a dataset, oldest first
    Jobs {
        #[arg(short, long)]
        dataset: String,

        /// 1-based listing page
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List datasets with at least one job
    Datasets {
        #[command(flatten)]
        source: SourceArgs,
    },
}

enum Backend {
    Local(SqliteStore),
    Remote(SquashClient),
}

impl Cli {
    fn format(&self, config: &Config) -> OutputFormat {
        self.format.unwrap_or(config.output.format)
    }

    fn pretty(&self, config: &Config) -> bool {
        self.pretty || config.output.pretty
    }

    fn writer(&self) -> Result<Box<dyn Write>> {
        match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(io::stdout())),
        }
    }

    fn open_store(db: Option<&Path>, config: &Config) -> Result<SqliteStore> {
        let path = db.map_or_else(|| config.store.resolved_path(), Path::to_path_buf);
        let store = SqliteStore::open(&path, config.store.page_size)
            .with_context(|| format!("Failed to open store {}", path.display()))?;
        info!(
            "Using local store {} (page size {})",
            path.display(),
            store.page_size()
        );
        Ok(store)
    }

    async fn backend(source: &SourceArgs, config: &Config) -> Result<Backend> {
        if source.db.is_none() {
            if let Some(url) = source.url.as_ref().or(config.api.base_url.as_ref()) {
                info!("Using SQUASH API at {url}");
                let token = source
                    .token
                    .as_ref()
                    .or(config.api.token.as_ref())
                    .map(|t| Token::from(t.as_str()));
                let client = SquashClient::connect(url, token).await?;
                return Ok(Backend::Remote(client));
            }
        }

        Ok(Backend::Local(Self::open_store(source.db.as_deref(), config)?))
    }

    async fn execute_monitor<S: DashboardSource>(
        &self,
        source: &S,
        config: &Config,
        dataset: Option<&str>,
        metric: Option<&str>,
        window: Window,
    ) -> Result<()> {
        let mut dataset = dataset
            .map(str::to_string)
            .or_else(|| config.monitor.dataset.clone());
        let mut metric = metric
            .map(str::to_string)
            .or_else(|| config.monitor.metric.clone());

        if dataset.is_none() || metric.is_none() {
            let defaults = source.defaults().await?;
            dataset = dataset.or(defaults.ci_dataset);
            metric = metric.or(defaults.metric);
        }

        let dataset = dataset.context("No dataset given and the source has no jobs")?;
        let metric = metric.context("No metric given and the source has no metrics")?;

        let format = self.format(config);
        let payload = Monitor::new(source, config.monitor.ci_interval_hours)
            .show_progress(format == OutputFormat::Summary)
            .collect(&dataset, &metric, window)
            .await?;

        self.emit_payload(&payload, config)
    }

    fn emit_payload(&self, payload: &MonitorPayload, config: &Config) -> Result<()> {
        let format = self.format(config);
        if format == OutputFormat::Summary && self.output.is_none() {
            print_summary(payload);
            return Ok(());
        }

        // a summary written to a file falls back to JSON
        let format = if format == OutputFormat::Summary {
            OutputFormat::Json
        } else {
            format
        };

        let mut writer = self.writer()?;
        export_payload(payload, format, self.pretty(config), &mut writer)?;

        if let Some(path) = &self.output {
            info!("Report written to: {}", path.display());
        }
        Ok(())
    }

    async fn execute_submit(&self, file: &Path, source: &SourceArgs, config: &Config) -> Result<()> {
        let contents = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read job file: {}", file.display()))?;
        let job: NewJob = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse job file: {}", file.display()))?;

        match Self::backend(source, config).await? {
            Backend::Local(mut store) => {
                let stored = store.create_job(job)?;
                eprintln!(
                    "{} job {} (ci_id {}) in dataset {}",
                    output::pass("Stored"),
                    stored.id,
                    stored.ci_id,
                    stored.ci_dataset
                );
            }
            Backend::Remote(client) => {
                let receipt = client.submit_job(&job).await?;
                eprintln!(
                    "{} job {} for dataset {}",
                    output::pass("Submitted"),
                    receipt.ci_id,
                    receipt.ci_dataset
                );
            }
        }

        Ok(())
    }

    fn execute_load_metrics(&self, file: &Path, db: Option<&Path>, config: &Config) -> Result<()> {
        let contents = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read metrics file: {}", file.display()))?;
        let metrics: Vec<Metric> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse metrics file: {}", file.display()))?;

        let store = Self::open_store(db, config)?;
        for metric in &metrics {
            store.upsert_metric(metric)?;
        }

        let counts = store.counts()?;
        eprintln!(
            "{} {} metric(s); store now holds {} metric(s) and {} job(s)",
            output::pass("Loaded"),
            metrics.len(),
            counts.metrics,
            counts.jobs
        );
        Ok(())
    }

    fn execute_changes(&self, job_id: JobId, db: Option<&Path>, config: &Config) -> Result<()> {
        let store = Self::open_store(db, config)?;
        let job = store
            .job(job_id)?
            .ok_or(SquashError::JobNotFound(job_id))?;
        let changed: Vec<_> = changed_packages(&store, &job)?.into_iter().collect();

        match self.format(config) {
            OutputFormat::Summary if self.output.is_none() => {
                output::print_changes(&job, &changed);
            }
            _ => {
                let report = json!({
                    "measurements": store.job_measurements(job.id)?,
                    "changed_packages": changed,
                    "job": job,
                });
                write_json(&report, self.pretty(config), &mut self.writer()?)?;
            }
        }
        Ok(())
    }

    fn execute_delete(&self, job_id: JobId, db: Option<&Path>, config: &Config) -> Result<()> {
        let store = Self::open_store(db, config)?;
        if !store.delete_job(job_id)? {
            return Err(SquashError::JobNotFound(job_id).into());
        }

        eprintln!("{} job {job_id}", output::pass("Deleted"));
        Ok(())
    }

    fn execute_jobs(&self, dataset: &str, page: usize, db: Option<&Path>, config: &Config) -> Result<()> {
        let store = Self::open_store(db, config)?;
        let jobs = store.list_jobs(dataset, page)?;

        match self.format(config) {
            OutputFormat::Summary if self.output.is_none() => {
                for job in &jobs.results {
                    println!(
                        "{} {} {} {}",
                        output::accent(job.id),
                        job.ci_id,
                        output::muted(job.date.format("%Y-%m-%d %H:%M")),
                        job.status.as_str()
                    );
                }
                eprintln!("{}", output::muted(format!("{} job(s) in {dataset}", jobs.count)));
            }
            _ => write_json(&jobs, self.pretty(config), &mut self.writer()?)?,
        }
        Ok(())
    }

    async fn execute_datasets(&self, source: &SourceArgs, config: &Config) -> Result<()> {
        let datasets = match Self::backend(source, config).await? {
            Backend::Local(store) => store.datasets()?,
            Backend::Remote(client) => client.datasets().await?,
        };

        match self.format(config) {
            OutputFormat::Summary if self.output.is_none() => {
                for dataset in &datasets {
                    println!("{}", output::accent(dataset));
                }
            }
            _ => write_json(&datasets, self.pretty(config), &mut self.writer()?)?,
        }
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Monitor {
                dataset,
                metric,
                window,
                source,
            } => {
                let window = window
                    .as_deref()
                    .map_or(config.monitor.window, Window::parse);

                match Self::backend(source, &config).await? {
                    Backend::Local(store) => {
                        self.execute_monitor(&store, &config, dataset.as_deref(), metric.as_deref(), window)
                            .await
                    }
                    Backend::Remote(client) => {
                        self.execute_monitor(&client, &config, dataset.as_deref(), metric.as_deref(), window)
                            .await
                    }
                }
            }
            Commands::Submit { file, source } => self.execute_submit(file, source, &config).await,
            Commands::LoadMetrics { file, db } => {
                self.execute_load_metrics(file, db.as_deref(), &config)
            }
            Commands::Changes { job, db } => self.execute_changes(*job, db.as_deref(), &config),
            Commands::Delete { job, db } => self.execute_delete(*job, db.as_deref(), &config),
            Commands::Jobs { dataset, page, db } => {
                self.execute_jobs(dataset, *page, db.as_deref(), &config)
            }
            Commands::Datasets { source } => self.execute_datasets(source, &config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_arguments_parse() {
        let cli = Cli::try_parse_from([
            "squash", "monitor", "--dataset", "cfht", "--metric", "AM1", "--window", "weeks",
            "--db", "/tmp/squash.db", "--format", "json",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Monitor {
                dataset,
                metric,
                window,
                source,
            } => {
                assert_eq!(dataset.as_deref(), Some("cfht"));
                assert_eq!(metric.as_deref(), Some("AM1"));
                assert_eq!(window.as_deref(), Some("weeks"));
                assert_eq!(source.db, Some(PathBuf::from("/tmp/squash.db")));
            }
            _ => panic!("expected monitor command"),
        }
    }

    #[test]
    fn test_changes_requires_job_id() {
        assert!(Cli::try_parse_from(["squash", "changes"]).is_err());
        assert!(Cli::try_parse_from(["squash", "changes", "--job", "7"]).is_ok());
    }

    #[tokio::test]
    async fn test_db_flag_selects_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceArgs {
            db: Some(dir.path().join("squash.db")),
            url: Some("http://127.0.0.1:9/never-contacted/".to_string()),
            token: None,
        };

        let backend = Cli::backend(&source, &Config::default()).await.unwrap();
        assert!(matches!(backend, Backend::Local(_)));
    }
}
