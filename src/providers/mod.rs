//! Measurement store boundary.
//!
//! The analysis code only talks to these traits. Two backends implement them:
//! a remote SQUASH REST API and a local SQLite store.

pub mod sqlite;
pub mod squash_api;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::window::Window;
use crate::error::Result;
use crate::models::{Metric, PackageKey};

pub use sqlite::SqliteStore;
pub use squash_api::SquashClient;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total number of items across all pages.
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// A measurement as served by the store, already annotated with the
/// packages that changed since the previous comparable job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub ci_id: String,
    #[serde(default)]
    pub ci_dataset: String,
    pub date: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub ci_url: String,
    #[serde(default)]
    pub changed_packages: Vec<PackageKey>,
}

/// Values the dashboard pre-selects when a request does not name them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub ci_id: Option<String>,
    #[serde(default)]
    pub ci_dataset: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub window: Window,
}

/// Metric preselected when it exists.
const DEFAULT_METRIC: &str = "AM1";

/// Metric the dashboard preselects: `AM1` when the catalogue has it,
/// otherwise the alphabetically first name. Both backends share this rule.
pub fn default_metric<'a, I>(names: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut first: Option<&str> = None;
    for name in names {
        if name == DEFAULT_METRIC {
            return Some(name.to_string());
        }
        first = Some(first.map_or(name, |current| current.min(name)));
    }
    first.map(str::to_string)
}

#[allow(async_fn_in_trait)]
pub trait MeasurementSource {
    /// Measurements of `metric` in `dataset`, ordered by job timestamp.
    /// `page` is 1-based.
    async fn measurement_page(
        &self,
        dataset: &str,
        metric: &str,
        page: usize,
    ) -> Result<Page<MeasurementRecord>>;
}

#[allow(async_fn_in_trait)]
pub trait MetricSource {
    async fn metric(&self, name: &str) -> Result<Option<Metric>>;
}

#[allow(async_fn_in_trait)]
pub trait DashboardSource: MeasurementSource + MetricSource {
    async fn datasets(&self) -> Result<Vec<String>>;

    async fn defaults(&self) -> Result<Defaults>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_metric_prefers_am1() {
        assert_eq!(default_metric(["PA1", "AM1", "AD1"]), Some("AM1".to_string()));
    }

    #[test]
    fn test_default_metric_falls_back_to_first_name() {
        assert_eq!(default_metric(["PA1", "AD1", "TE2"]), Some("AD1".to_string()));
        assert_eq!(default_metric(Vec::<&str>::new()), None);
    }
}
