use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Store-assigned primary key of a job.
pub type JobId = i64;

/// Outcome of a CI job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Ok,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(Self::Ok),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A package version resolved by the build that produced a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyVersion {
    pub name: String,
    pub git_url: String,
    pub git_commit: String,
    #[serde(default)]
    pub git_branch: String,
    #[serde(default)]
    pub build_version: String,
}

impl DependencyVersion {
    /// Identity used when diffing two jobs; branch and build version are descriptive only.
    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.clone(),
            git_commit: self.git_commit.clone(),
            git_url: self.git_url.clone(),
        }
    }
}

/// `(name, commit, git_url)` triple. Serialized as a 3-element array.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(
    from = "(String, String, String)",
    into = "(String, String, String)"
)]
pub struct PackageKey {
    pub name: String,
    pub git_commit: String,
    pub git_url: String,
}

impl PackageKey {
    pub fn new(name: &str, git_commit: &str, git_url: &str) -> Self {
        Self {
            name: name.to_owned(),
            git_commit: git_commit.to_owned(),
            git_url: git_url.to_owned(),
        }
    }
}

impl From<(String, String, String)> for PackageKey {
    fn from((name, git_commit, git_url): (String, String, String)) -> Self {
        Self {
            name,
            git_commit,
            git_url,
        }
    }
}

impl From<PackageKey> for (String, String, String) {
    fn from(key: PackageKey) -> Self {
        (key.name, key.git_commit, key.git_url)
    }
}

/// A persisted CI job together with its dependency snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Identifier in the CI system. Reused across datasets and reruns.
    pub ci_id: String,
    pub ci_name: String,
    pub ci_dataset: String,
    pub ci_label: String,
    pub ci_url: String,
    pub date: DateTime<Utc>,
    pub status: JobStatus,
    pub packages: Vec<DependencyVersion>,
}

/// Job submission as sent by a CI client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub ci_id: String,
    #[serde(default)]
    pub ci_name: String,
    pub ci_dataset: String,
    #[serde(default)]
    pub ci_label: String,
    #[serde(default)]
    pub ci_url: String,
    /// Back-filled timestamp. The store assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub packages: Vec<DependencyVersion>,
    #[serde(default)]
    pub measurements: Vec<NewMeasurement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub metric: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub job_id: JobId,
    pub metric: String,
    pub value: f64,
    pub metadata: Option<serde_json::Value>,
}

/// Comparison used to test a measurement against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Whether `value <op> threshold` holds.
    #[allow(clippy::float_cmp)]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named threshold of a metric specification bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Reference data describing what a measurement means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(rename = "metric")]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, deserialize_with = "deserialize_specs")]
    pub specs: Vec<Specification>,
}

impl Metric {
    /// Value of the first specification named `name`, if one is configured.
    pub fn threshold(&self, name: &str) -> Option<f64> {
        self.specs
            .iter()
            .find(|spec| spec.name == name)
            .and_then(|spec| spec.value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecsField {
    List(Vec<Specification>),
    Encoded(String),
}

/// Decodes the specification bundle once. Older servers send the array
/// serialized into a JSON string; both shapes end up as the same typed list.
fn deserialize_specs<'de, D>(deserializer: D) -> Result<Vec<Specification>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<SpecsField>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(SpecsField::List(specs)) => Ok(specs),
        Some(SpecsField::Encoded(text)) if text.trim().is_empty() => Ok(Vec::new()),
        Some(SpecsField::Encoded(text)) => decode_specs(&text).map_err(de::Error::custom),
    }
}

/// Parses a JSON-encoded specification bundle.
pub fn decode_specs(text: &str) -> serde_json::Result<Vec<Specification>> {
    serde_json::from_str(text)
}
