use std::collections::HashSet;

use crate::error::{Result, SquashError};
use crate::models::{Metric, NewJob};

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SquashError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Checks a submission before it touches the store. Metric existence is
/// checked inside the write transaction.
pub(super) fn validate_job(job: &NewJob) -> Result<()> {
    require(&job.ci_id, "ci_id")?;
    require(&job.ci_dataset, "ci_dataset")?;

    for (index, package) in job.packages.iter().enumerate() {
        require(&package.name, &format!("packages[{index}].name"))?;
        require(&package.git_commit, &format!("packages[{index}].git_commit"))?;
        require(&package.git_url, &format!("packages[{index}].git_url"))?;
    }

    let mut seen = HashSet::new();
    for (index, measurement) in job.measurements.iter().enumerate() {
        require(&measurement.metric, &format!("measurements[{index}].metric"))?;

        if !measurement.value.is_finite() {
            return Err(SquashError::Validation(format!(
                "measurement of {} has non-finite value {}",
                measurement.metric, measurement.value
            )));
        }

        if !seen.insert(measurement.metric.as_str()) {
            return Err(SquashError::Validation(format!(
                "metric {} measured more than once",
                measurement.metric
            )));
        }
    }

    Ok(())
}

pub(super) fn validate_metric(metric: &Metric) -> Result<()> {
    require(&metric.name, "metric")?;

    for spec in &metric.specs {
        require(&spec.name, &format!("{} specification name", metric.name))?;
        if spec.value.is_some_and(|value| !value.is_finite()) {
            return Err(SquashError::Validation(format!(
                "{} specification {} is not finite",
                metric.name, spec.name
            )));
        }
    }

    Ok(())
}
