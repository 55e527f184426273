use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::window::Window;
use crate::models::{Operator, PackageKey};

/// Everything the presentation layer needs for one (dataset, metric) view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorPayload {
    pub dataset: String,
    pub metric: String,
    pub window: Window,
    pub collected_at: DateTime<Utc>,
    pub specs: MetricSpecs,
    pub history: MetricHistory,
    pub gaps: Vec<GapInterval>,
}

/// Co-indexed measurement history, ascending by job timestamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricHistory {
    pub ci_ids: Vec<i64>,
    pub dates: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
    pub ci_urls: Vec<String>,
    pub changed_packages: Vec<Vec<PackageKey>>,
    pub package_names: Vec<Vec<String>>,
    pub package_urls: Vec<Vec<String>>,
}

impl MetricHistory {
    pub fn len(&self) -> usize {
        self.ci_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ci_ids.is_empty()
    }
}

/// Time span to shade between two consecutive jobs. Zero-width when the ids are contiguous.
///
/// `missing` counts the CI ids skipped between the two jobs. It decides
/// whether this is a gap, since back-filled jobs may share a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub missing: i64,
}

impl GapInterval {
    pub fn is_gap(&self) -> bool {
        self.missing > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpecs {
    pub metric: String,
    pub unit: String,
    pub description: String,
    pub operator: Operator,
    pub minimum: Option<f64>,
    pub design: Option<f64>,
    pub stretch: Option<f64>,
}

/// Best threshold a value satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Failing,
    Minimum,
    Design,
    Stretch,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failing => "failing",
            Self::Minimum => "minimum",
            Self::Design => "design",
            Self::Stretch => "stretch",
        }
    }
}

impl MetricSpecs {
    /// Grades `value` against the configured thresholds, strictest first.
    /// `None` when the metric has no thresholds at all.
    pub fn grade(&self, value: f64) -> Option<Grade> {
        let levels = [
            (self.stretch, Grade::Stretch),
            (self.design, Grade::Design),
            (self.minimum, Grade::Minimum),
        ];

        if levels.iter().all(|(threshold, _)| threshold.is_none()) {
            return None;
        }

        let met = levels.iter().find_map(|&(threshold, grade)| {
            threshold
                .filter(|&t| self.operator.holds(value, t))
                .map(|_| grade)
        });

        Some(met.unwrap_or(Grade::Failing))
    }
}
