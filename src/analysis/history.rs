use futures::future::try_join_all;
use log::{debug, info};

use super::links::package_links;
use super::window::{num_pages, start_page, Window};
use crate::dashboard::MetricHistory;
use crate::error::{Result, SquashError};
use crate::providers::{MeasurementRecord, MeasurementSource};

/// Walks the paginated measurement listing of one (dataset, metric) pair,
/// fetching only the pages that cover the requested window.
pub struct HistoryFetcher<'a, S> {
    source: &'a S,
    ci_interval_hours: u64,
}

impl<'a, S: MeasurementSource> HistoryFetcher<'a, S> {
    pub fn new(source: &'a S, ci_interval_hours: u64) -> Self {
        Self {
            source,
            ci_interval_hours,
        }
    }

    /// Fetches the windowed history as co-indexed columns.
    ///
    /// # Errors
    ///
    /// Transport errors from the source are returned unchanged. A CI id that
    /// is not an integer is reported as `DataIntegrity`.
    pub async fn fetch(&self, dataset: &str, metric: &str, window: Window) -> Result<MetricHistory> {
        let records = self.fetch_records(dataset, metric, window).await?;
        history_from_records(records)
    }

    /// Fetches the raw records in the window, ascending by job date.
    ///
    /// Page size is taken from the length of the first page and page count is
    /// derived from it, so a short page anywhere but at the end skews the
    /// window arithmetic.
    pub async fn fetch_records(
        &self,
        dataset: &str,
        metric: &str,
        window: Window,
    ) -> Result<Vec<MeasurementRecord>> {
        let first = self.source.measurement_page(dataset, metric, 1).await?;

        let page_size = first.results.len();
        if page_size == 0 {
            info!("No measurements of {metric} for dataset {dataset}");
            return Ok(Vec::new());
        }

        let num_pages = num_pages(first.count, page_size);
        let start = start_page(page_size, num_pages, window, self.ci_interval_hours);

        debug!(
            "{} measurements in {num_pages} page(s) of {page_size}; window {window} starts at page {start}",
            first.count
        );

        let mut records = Vec::new();
        let mut next_page = start;
        if start == 1 {
            records.extend(first.results);
            next_page = 2;
        }

        let pages = try_join_all(
            (next_page..=num_pages)
                .map(|page| self.source.measurement_page(dataset, metric, page)),
        )
        .await?;

        for page in pages {
            records.extend(page.results);
        }

        // stable: keeps the store's tie-break order for equal dates
        records.sort_by_key(|record| record.date);

        info!(
            "Fetched {} measurements of {metric} for dataset {dataset}",
            records.len()
        );

        Ok(records)
    }
}

/// Converts records into the co-indexed history columns.
pub fn history_from_records(records: Vec<MeasurementRecord>) -> Result<MetricHistory> {
    let mut history = MetricHistory::default();

    for record in records {
        let ci_id = parse_ci_id(&record.ci_id)?;
        let (names, urls) = package_links(&record.changed_packages);

        history.ci_ids.push(ci_id);
        history.dates.push(record.date);
        history.values.push(record.value);
        history.ci_urls.push(record.ci_url);
        history.changed_packages.push(record.changed_packages);
        history.package_names.push(names);
        history.package_urls.push(urls);
    }

    Ok(history)
}

fn parse_ci_id(value: &str) -> Result<i64> {
    value.trim().parse().map_err(|_| {
        SquashError::DataIntegrity(format!("CI id '{value}' is not an integer"))
    })
}
