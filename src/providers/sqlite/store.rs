use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use super::validation::{validate_job, validate_metric};
use crate::analysis::changed_packages::{changed_packages, JobHistory, JobRef};
use crate::analysis::window::Window;
use crate::error::{Result, SquashError};
use crate::models::{
    decode_specs, DependencyVersion, Job, JobId, JobStatus, Measurement, Metric, NewJob, Operator,
};
use crate::providers::{
    DashboardSource, Defaults, MeasurementRecord, MeasurementSource, MetricSource, Page,
    default_metric,
};

/// Page size of listings when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 100;

const JOB_COLUMNS: &str =
    "j.id, j.ci_id, j.ci_name, j.ci_dataset, j.ci_label, j.ci_url, j.date_us, j.status";

/// Row totals, used by the CLI after loads and by tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub metrics: usize,
    pub jobs: usize,
    pub packages: usize,
    pub measurements: usize,
}

pub struct SqliteStore {
    conn: Connection,
    page_size: usize,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        debug!("Opened store at {}", path.display());
        Self::init(conn, page_size)
    }

    pub fn open_in_memory(page_size: usize) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, page_size)
    }

    fn init(conn: Connection, page_size: usize) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn,
            page_size: page_size.max(1),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn upsert_metric(&self, metric: &Metric) -> Result<()> {
        validate_metric(metric)?;
        let specs = serde_json::to_string(&metric.specs)?;

        self.conn.execute(
            r#"
            INSERT INTO metrics (name, unit, description, operator, specs)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO UPDATE SET
                unit = excluded.unit,
                description = excluded.description,
                operator = excluded.operator,
                specs = excluded.specs
            "#,
            params![
                metric.name,
                metric.unit,
                metric.description,
                metric.operator.as_str(),
                specs,
            ],
        )?;

        Ok(())
    }

    pub fn metric(&self, name: &str) -> Result<Option<Metric>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, unit, description, operator, specs FROM metrics WHERE name = ?1",
                params![name],
                MetricRow::from_row,
            )
            .optional()?;

        row.map(MetricRow::into_metric).transpose()
    }

    pub fn metrics(&self) -> Result<Vec<Metric>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, unit, description, operator, specs FROM metrics ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], MetricRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(MetricRow::into_metric).collect()
    }

    /// Persists a job with its packages and measurements atomically.
    ///
    /// # Errors
    ///
    /// `Validation` if the submission is malformed or names an unknown
    /// metric. Nothing is written when any step fails.
    pub fn create_job(&mut self, new_job: NewJob) -> Result<Job> {
        validate_job(&new_job)?;

        let tx = self.conn.transaction()?;

        for measurement in &new_job.measurements {
            if !metric_exists(&tx, &measurement.metric)? {
                return Err(SquashError::Validation(format!(
                    "unknown metric {}",
                    measurement.metric
                )));
            }
        }

        let date = match new_job.date {
            Some(date) => date,
            None => next_timestamp(&tx)?,
        };

        tx.execute(
            r#"
            INSERT INTO jobs (ci_id, ci_name, ci_dataset, ci_label, ci_url, date_us, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                new_job.ci_id,
                new_job.ci_name,
                new_job.ci_dataset,
                new_job.ci_label,
                new_job.ci_url,
                date.timestamp_micros(),
                new_job.status.as_str(),
            ],
        )?;
        let job_id = tx.last_insert_rowid();

        for (position, package) in new_job.packages.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO packages (job_id, position, name, git_url, git_commit, git_branch, build_version)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    job_id,
                    i64::try_from(position).unwrap_or(i64::MAX),
                    package.name,
                    package.git_url,
                    package.git_commit,
                    package.git_branch,
                    package.build_version,
                ],
            )?;
        }

        for measurement in &new_job.measurements {
            let metadata = measurement
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            tx.execute(
                "INSERT INTO measurements (job_id, metric, value, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![job_id, measurement.metric, measurement.value, metadata],
            )?;
        }

        tx.commit()?;

        info!(
            "Stored job {job_id} (ci_id {}, dataset {}) with {} package(s) and {} measurement(s)",
            new_job.ci_id,
            new_job.ci_dataset,
            new_job.packages.len(),
            new_job.measurements.len()
        );

        Ok(Job {
            id: job_id,
            ci_id: new_job.ci_id,
            ci_name: new_job.ci_name,
            ci_dataset: new_job.ci_dataset,
            ci_label: new_job.ci_label,
            ci_url: new_job.ci_url,
            date: from_micros(date.timestamp_micros())?,
            status: new_job.status,
            packages: new_job.packages,
        })
    }

    /// Deletes a job together with its packages and measurements.
    /// Returns whether the job existed.
    pub fn delete_job(&self, id: JobId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn job(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs j WHERE j.id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], JobRow::from_row)
            .optional()?;

        row.map(|row| self.hydrate(row)).transpose()
    }

    /// Most recent job across all datasets.
    pub fn latest_job(&self) -> Result<Option<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs j ORDER BY j.date_us DESC, j.id DESC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, [], JobRow::from_row)
            .optional()?;

        row.map(|row| self.hydrate(row)).transpose()
    }

    pub fn datasets(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT ci_dataset FROM jobs ORDER BY ci_dataset")?;
        let datasets = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(datasets)
    }

    /// Jobs of `dataset` in ascending `(date, id)` order.
    pub fn list_jobs(&self, dataset: &str, page: usize) -> Result<Page<Job>> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE ci_dataset = ?1",
            params![dataset],
            |row| row.get(0),
        )?;

        let (limit, offset) = self.limit_offset(page);
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs j
            WHERE j.ci_dataset = ?1
            ORDER BY j.date_us, j.id
            LIMIT ?2 OFFSET ?3
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![dataset, limit, offset], JobRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let results = rows
            .into_iter()
            .map(|row| self.hydrate(row))
            .collect::<Result<Vec<_>>>()?;

        Ok(page_of(count, results))
    }

    /// Measurements of `metric` in `dataset` ordered by job `(date, id)`, each
    /// annotated with the packages changed since the previous comparable job.
    pub fn list_measurements(
        &self,
        dataset: &str,
        metric: &str,
        page: usize,
    ) -> Result<Page<MeasurementRecord>> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM measurements m
            JOIN jobs j ON j.id = m.job_id
            WHERE j.ci_dataset = ?1 AND m.metric = ?2
            "#,
            params![dataset, metric],
            |row| row.get(0),
        )?;

        let (limit, offset) = self.limit_offset(page);
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}, m.value FROM measurements m
            JOIN jobs j ON j.id = m.job_id
            WHERE j.ci_dataset = ?1 AND m.metric = ?2
            ORDER BY j.date_us, j.id
            LIMIT ?3 OFFSET ?4
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![dataset, metric, limit, offset], |row| {
                Ok((JobRow::from_row(row)?, row.get::<_, f64>(8)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(rows.len());
        for (row, value) in rows {
            let job = self.hydrate(row)?;
            let changed = changed_packages(self, &job)?;

            results.push(MeasurementRecord {
                ci_id: job.ci_id,
                ci_dataset: job.ci_dataset,
                date: job.date,
                value,
                ci_url: job.ci_url,
                changed_packages: changed.into_iter().collect(),
            });
        }

        Ok(page_of(count, results))
    }

    /// Measurements recorded by one job, ordered by metric name.
    pub fn job_measurements(&self, job_id: JobId) -> Result<Vec<Measurement>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, metric, value, metadata FROM measurements WHERE job_id = ?1 ORDER BY metric",
        )?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(job_id, metric, value, metadata)| {
                Ok(Measurement {
                    job_id,
                    metric,
                    value,
                    metadata: metadata
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()?,
                })
            })
            .collect()
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        };

        Ok(StoreCounts {
            metrics: count("metrics")?,
            jobs: count("jobs")?,
            packages: count("packages")?,
            measurements: count("measurements")?,
        })
    }

    fn hydrate(&self, row: JobRow) -> Result<Job> {
        let packages = self.load_packages(row.id)?;
        row.into_job(packages)
    }

    fn load_packages(&self, job_id: JobId) -> Result<Vec<DependencyVersion>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, git_url, git_commit, git_branch, build_version
            FROM packages
            WHERE job_id = ?1
            ORDER BY position
            "#,
        )?;
        let packages = stmt
            .query_map(params![job_id], |row| {
                Ok(DependencyVersion {
                    name: row.get(0)?,
                    git_url: row.get(1)?,
                    git_commit: row.get(2)?,
                    git_branch: row.get(3)?,
                    build_version: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packages)
    }

    fn limit_offset(&self, page: usize) -> (i64, i64) {
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let skipped = i64::try_from(page.max(1) - 1).unwrap_or(i64::MAX);
        (limit, skipped.saturating_mul(limit))
    }
}

impl JobHistory for SqliteStore {
    fn previous_comparable(&self, job: &Job) -> Result<Option<JobRef>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT id, ci_id FROM jobs
            WHERE ci_dataset = ?1
              AND ci_id != ?4
              AND (date_us < ?2 OR (date_us = ?2 AND id < ?3))
            ORDER BY date_us DESC, id DESC
            LIMIT 1
            "#,
        )?;
        let previous = stmt
            .query_row(
                params![
                    job.ci_dataset,
                    job.date.timestamp_micros(),
                    job.id,
                    job.ci_id
                ],
                |row| {
                    Ok(JobRef {
                        id: row.get(0)?,
                        ci_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(previous)
    }

    fn packages(&self, job_id: JobId) -> Result<Vec<DependencyVersion>> {
        self.load_packages(job_id)
    }
}

impl MeasurementSource for SqliteStore {
    async fn measurement_page(
        &self,
        dataset: &str,
        metric: &str,
        page: usize,
    ) -> Result<Page<MeasurementRecord>> {
        self.list_measurements(dataset, metric, page)
    }
}

impl MetricSource for SqliteStore {
    async fn metric(&self, name: &str) -> Result<Option<Metric>> {
        Self::metric(self, name)
    }
}

impl DashboardSource for SqliteStore {
    async fn datasets(&self) -> Result<Vec<String>> {
        Self::datasets(self)
    }

    async fn defaults(&self) -> Result<Defaults> {
        let latest = self.latest_job()?;

        let metrics = self.metrics()?;
        let metric = default_metric(metrics.iter().map(|m| m.name.as_str()));

        Ok(Defaults {
            ci_id: latest.as_ref().map(|job| job.ci_id.clone()),
            ci_dataset: latest.map(|job| job.ci_dataset),
            metric,
            window: Window::Months,
        })
    }
}

struct JobRow {
    id: JobId,
    ci_id: String,
    ci_name: String,
    ci_dataset: String,
    ci_label: String,
    ci_url: String,
    date_us: i64,
    status: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ci_id: row.get(1)?,
            ci_name: row.get(2)?,
            ci_dataset: row.get(3)?,
            ci_label: row.get(4)?,
            ci_url: row.get(5)?,
            date_us: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_job(self, packages: Vec<DependencyVersion>) -> Result<Job> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            SquashError::DataIntegrity(format!(
                "job {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;

        Ok(Job {
            id: self.id,
            ci_id: self.ci_id,
            ci_name: self.ci_name,
            ci_dataset: self.ci_dataset,
            ci_label: self.ci_label,
            ci_url: self.ci_url,
            date: from_micros(self.date_us)?,
            status,
            packages,
        })
    }
}

struct MetricRow {
    name: String,
    unit: String,
    description: String,
    operator: String,
    specs: String,
}

impl MetricRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            unit: row.get(1)?,
            description: row.get(2)?,
            operator: row.get(3)?,
            specs: row.get(4)?,
        })
    }

    fn into_metric(self) -> Result<Metric> {
        let operator = Operator::parse(&self.operator).ok_or_else(|| {
            SquashError::DataIntegrity(format!(
                "metric {} has unknown operator '{}'",
                self.name, self.operator
            ))
        })?;

        Ok(Metric {
            specs: decode_specs(&self.specs)?,
            name: self.name,
            unit: self.unit,
            description: self.description,
            operator,
        })
    }
}

fn metric_exists(tx: &Transaction<'_>, name: &str) -> Result<bool> {
    let exists = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM metrics WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// `now`, or one microsecond past the newest job when the clock is behind it.
fn next_timestamp(tx: &Transaction<'_>) -> Result<DateTime<Utc>> {
    let newest: Option<i64> = tx.query_row("SELECT MAX(date_us) FROM jobs", [], |row| row.get(0))?;
    let now = Utc::now().timestamp_micros();

    let micros = match newest {
        Some(newest) if newest >= now => newest.saturating_add(1),
        _ => now,
    };
    from_micros(micros)
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).unwrap_or_default();

    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        SquashError::DataIntegrity(format!("timestamp {micros} is out of range"))
    })
}

fn page_of<T>(count: i64, results: Vec<T>) -> Page<T> {
    Page {
        count: usize::try_from(count).unwrap_or_default(),
        next: None,
        previous: None,
        results,
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            name TEXT PRIMARY KEY,
            unit TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            operator TEXT NOT NULL DEFAULT '<',
            specs TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ci_id TEXT NOT NULL,
            ci_name TEXT NOT NULL DEFAULT '',
            ci_dataset TEXT NOT NULL,
            ci_label TEXT NOT NULL DEFAULT '',
            ci_url TEXT NOT NULL DEFAULT '',
            date_us INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'ok'
        );

        CREATE INDEX IF NOT EXISTS jobs_dataset_date ON jobs (ci_dataset, date_us, id);

        CREATE TABLE IF NOT EXISTS packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES jobs (id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            git_url TEXT NOT NULL,
            git_commit TEXT NOT NULL,
            git_branch TEXT NOT NULL DEFAULT '',
            build_version TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS packages_job ON packages (job_id);

        CREATE TABLE IF NOT EXISTS measurements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES jobs (id) ON DELETE CASCADE,
            metric TEXT NOT NULL REFERENCES metrics (name),
            value REAL NOT NULL,
            metadata TEXT,
            UNIQUE (job_id, metric)
        );

        CREATE INDEX IF NOT EXISTS measurements_metric ON measurements (metric);
        "#,
    )?;

    Ok(())
}
