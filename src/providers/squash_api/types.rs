use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::{Result, SquashError};

/// Endpoint map served at the API root.
#[derive(Debug, Deserialize)]
pub(super) struct ApiRoot {
    jobs: String,
    metrics: String,
    measurements: String,
    datasets: String,
    #[serde(default)]
    defaults: Option<String>,
}

/// Resolved endpoint URLs, fetched once per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub jobs: Url,
    pub metrics: Url,
    pub measurements: Url,
    pub datasets: Url,
    /// Older deployments do not serve defaults.
    pub defaults: Option<Url>,
}

impl Endpoints {
    pub(super) fn resolve(root: &Url, api: ApiRoot) -> Result<Self> {
        let join = |name: &str, value: &str| {
            root.join(value).map_err(|e| {
                SquashError::Config(format!("Invalid {name} endpoint '{value}': {e}"))
            })
        };

        Ok(Self {
            jobs: join("jobs", &api.jobs)?,
            metrics: join("metrics", &api.metrics)?,
            measurements: join("measurements", &api.measurements)?,
            datasets: join("datasets", &api.datasets)?,
            defaults: api
                .defaults
                .as_deref()
                .map(|value| join("defaults", value))
                .transpose()?,
        })
    }
}

/// What the API echoes back for an accepted job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobReceipt {
    #[serde(default)]
    pub ci_id: String,
    #[serde(default)]
    pub ci_dataset: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}
