use chrono::Utc;
use log::info;

use super::gaps::detect_gaps;
use super::history::HistoryFetcher;
use super::specs::lookup_specs;
use super::window::Window;
use crate::dashboard::MonitorPayload;
use crate::error::Result;
use crate::output::PhaseProgress;
use crate::providers::{MeasurementSource, MetricSource};

/// Assembles the monitor payload for one (dataset, metric) pair.
///
/// Runs in three phases:
/// 1. Resolving the metric specification
/// 2. Fetching the windowed measurement history
/// 3. Detecting gaps in job continuity
pub struct Monitor<'a, S> {
    source: &'a S,
    ci_interval_hours: u64,
    show_progress: bool,
}

impl<'a, S> Monitor<'a, S>
where
    S: MeasurementSource + MetricSource,
{
    pub fn new(source: &'a S, ci_interval_hours: u64) -> Self {
        Self {
            source,
            ci_interval_hours,
            show_progress: false,
        }
    }

    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the metric is unknown, the source fails, or a
    /// served CI id is not numeric.
    pub async fn collect(
        &self,
        dataset: &str,
        metric: &str,
        window: Window,
    ) -> Result<MonitorPayload> {
        info!("Collecting {metric} history for dataset {dataset} ({window})");

        let progress = PhaseProgress::start_phase_1(self.show_progress);
        let specs = lookup_specs(self.source, metric).await?;

        let progress = progress.finish_phase_1_start_phase_2();
        let history = HistoryFetcher::new(self.source, self.ci_interval_hours)
            .fetch(dataset, metric, window)
            .await?;

        let progress = progress.finish_phase_2_start_phase_3(history.len());
        let gaps = detect_gaps(&history.ci_ids, &history.dates);
        progress.finish_phase_3(gaps.iter().filter(|gap| gap.is_gap()).count());

        Ok(MonitorPayload {
            dataset: dataset.to_string(),
            metric: metric.to_string(),
            window,
            collected_at: Utc::now(),
            specs,
            history,
            gaps,
        })
    }
}
