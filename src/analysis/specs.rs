use log::debug;

use crate::dashboard::MetricSpecs;
use crate::error::{Result, SquashError};
use crate::models::Metric;
use crate::providers::MetricSource;

const MINIMUM: &str = "minimum";
const DESIGN: &str = "design";
const STRETCH: &str = "stretch";

impl From<&Metric> for MetricSpecs {
    fn from(metric: &Metric) -> Self {
        Self {
            metric: metric.name.clone(),
            unit: metric.unit.clone(),
            description: metric.description.clone(),
            operator: metric.operator,
            minimum: metric.threshold(MINIMUM),
            design: metric.threshold(DESIGN),
            stretch: metric.threshold(STRETCH),
        }
    }
}

/// Resolves a metric name to its unit, description and thresholds.
///
/// Thresholds missing from the specification bundle stay `None`.
///
/// # Errors
///
/// Returns `MetricNotFound` when the source has no metric with that name.
pub async fn lookup_specs<S>(source: &S, name: &str) -> Result<MetricSpecs>
where
    S: MetricSource,
{
    let metric = source
        .metric(name)
        .await?
        .ok_or_else(|| SquashError::MetricNotFound(name.to_string()))?;

    debug!(
        "Metric {} has {} specification(s)",
        metric.name,
        metric.specs.len()
    );

    Ok(MetricSpecs::from(&metric))
}
