use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::types::{ApiRoot, Endpoints, JobReceipt};
use crate::analysis::window::Window;
use crate::auth::Token;
use crate::error::{Result, SquashError};
use crate::models::{Metric, NewJob};
use crate::providers::{
    DashboardSource, Defaults, MeasurementRecord, MeasurementSource, MetricSource, Page,
    default_metric,
};

const USER_AGENT: &str = concat!("squash/", env!("CARGO_PKG_VERSION"));

/// Dataset preselected when the API serves no defaults.
const DEFAULT_DATASET: &str = "cfht";

pub struct SquashClient {
    client: Client,
    endpoints: Endpoints,
    token: Option<Token>,
}

impl SquashClient {
    /// Builds a client and resolves the endpoint map from the API root.
    ///
    /// # Errors
    ///
    /// `Config` for an unparseable URL, `Network` or `ApiError` when the
    /// root cannot be fetched.
    pub async fn connect(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SquashError::Config(format!("Failed to create HTTP client: {e}")))?;

        let root = Url::parse(base_url)
            .map_err(|e| SquashError::Config(format!("Invalid API URL: {e}")))?;

        let api: ApiRoot = read_json(client.get(root.clone()).send().await?).await?;
        let endpoints = Endpoints::resolve(&root, api)?;
        debug!("Resolved SQUASH endpoints: {endpoints:?}");

        Ok(Self {
            client,
            endpoints,
            token,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.auth_request(self.client.get(url)).send().await?;
        read_json(response).await
    }

    /// Every registered metric, walking the paginated listing.
    pub async fn metrics(&self) -> Result<Vec<Metric>> {
        let mut metrics = Vec::new();
        let mut next = Some(self.endpoints.metrics.clone());

        while let Some(url) = next {
            let page: Page<Metric> = self.get(url).await?;
            metrics.extend(page.results);

            next = page
                .next
                .map(|link| {
                    self.endpoints.metrics.join(&link).map_err(|e| {
                        SquashError::DataIntegrity(format!("Invalid next link '{link}': {e}"))
                    })
                })
                .transpose()?;
        }

        debug!("Fetched {} metric(s)", metrics.len());
        Ok(metrics)
    }

    /// Submits a job with its packages and measurements.
    ///
    /// # Errors
    ///
    /// A 400 response is reported as `Validation` with the server's message.
    pub async fn submit_job(&self, job: &NewJob) -> Result<JobReceipt> {
        let response = self
            .auth_request(self.client.post(self.endpoints.jobs.clone()).json(job))
            .send()
            .await?;

        let receipt: JobReceipt = read_json(response).await.map_err(|e| match e {
            SquashError::ApiError { status, message } if status == StatusCode::BAD_REQUEST.as_u16() => {
                SquashError::Validation(message)
            }
            other => other,
        })?;

        info!(
            "Submitted job {} for dataset {} with {} measurement(s)",
            job.ci_id,
            job.ci_dataset,
            job.measurements.len()
        );
        Ok(receipt)
    }
}

/// Fails on non-success statuses, otherwise decodes the body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(SquashError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}

impl MeasurementSource for SquashClient {
    async fn measurement_page(
        &self,
        dataset: &str,
        metric: &str,
        page: usize,
    ) -> Result<Page<MeasurementRecord>> {
        let mut url = self.endpoints.measurements.clone();
        url.query_pairs_mut()
            .append_pair("job__ci_dataset", dataset)
            .append_pair("metric", metric)
            .append_pair("page", &page.to_string());

        self.get(url).await
    }
}

impl MetricSource for SquashClient {
    async fn metric(&self, name: &str) -> Result<Option<Metric>> {
        Ok(self
            .metrics()
            .await?
            .into_iter()
            .find(|metric| metric.name == name))
    }
}

impl DashboardSource for SquashClient {
    async fn datasets(&self) -> Result<Vec<String>> {
        self.get(self.endpoints.datasets.clone()).await
    }

    async fn defaults(&self) -> Result<Defaults> {
        if let Some(url) = &self.endpoints.defaults {
            return self.get(url.clone()).await;
        }

        let datasets = DashboardSource::datasets(self).await?;
        let ci_dataset = if datasets.iter().any(|d| d == DEFAULT_DATASET) {
            Some(DEFAULT_DATASET.to_string())
        } else {
            datasets.into_iter().next()
        };

        let metrics = self.metrics().await?;
        let metric = default_metric(metrics.iter().map(|m| m.name.as_str()));

        Ok(Defaults {
            ci_id: None,
            ci_dataset,
            metric,
            window: Window::Months,
        })
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::analysis::history::HistoryFetcher;

    /// Mocks are removed on drop, so the root mock is handed back to the caller.
    async fn server_with_root(defaults: bool) -> (ServerGuard, Mock) {
        let mut server = Server::new_async().await;
        let base = server.url();

        let mut root = json!({
            "jobs": format!("{base}/dashboard/api/jobs/"),
            "metrics": format!("{base}/dashboard/api/metrics/"),
            "measurements": format!("{base}/dashboard/api/measurements/"),
            "datasets": format!("{base}/dashboard/api/datasets/"),
        });
        if defaults {
            root["defaults"] = json!(format!("{base}/dashboard/api/defaults/"));
        }

        let root = server
            .mock("GET", "/dashboard/api/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(root.to_string())
            .create_async()
            .await;

        (server, root)
    }

    async fn connect(server: &ServerGuard, token: Option<Token>) -> SquashClient {
        SquashClient::connect(&format!("{}/dashboard/api/", server.url()), token)
            .await
            .unwrap()
    }

    fn record(ci_id: u32, day: u32) -> serde_json::Value {
        json!({
            "ci_id": ci_id.to_string(),
            "ci_dataset": "cfht",
            "date": format!("2017-03-{day:02}T05:22:37.700146Z"),
            "value": f64::from(ci_id) / 10.0,
            "ci_url": format!("https://ci.lsst.codes/job/validate_drp/{ci_id}/"),
            "changed_packages": [["afw", format!("c{ci_id}"), "https://github.com/lsst/afw.git"]],
        })
    }

    #[tokio::test]
    async fn test_connect_resolves_endpoint_map_once() {
        let (server, _root) = server_with_root(false).await;
        let client = connect(&server, None).await;

        assert_eq!(
            client.endpoints().measurements.as_str(),
            format!("{}/dashboard/api/measurements/", server.url())
        );
        assert!(client.endpoints().defaults.is_none());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = SquashClient::connect("not a url", None).await;
        assert!(matches!(result, Err(SquashError::Config(_))));
    }

    #[tokio::test]
    async fn test_measurement_page_filters_by_dataset_metric_and_page() {
        let (mut server, _root) = server_with_root(false).await;
        let mock = server
            .mock("GET", "/dashboard/api/measurements/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("job__ci_dataset".into(), "cfht".into()),
                Matcher::UrlEncoded("metric".into(), "AM1".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"count": 3, "next": null, "previous": null, "results": [record(3, 3)]}).to_string())
            .create_async()
            .await;

        let client = connect(&server, None).await;
        let page = client.measurement_page("cfht", "AM1", 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.count, 3);
        assert_eq!(page.results[0].ci_id, "3");
        assert_eq!(page.results[0].changed_packages[0].git_commit, "c3");
    }

    #[tokio::test]
    async fn test_history_is_fetched_through_the_api() {
        let (mut server, _root) = server_with_root(false).await;
        let mut pages = Vec::new();
        for (page, records) in [(1, vec![record(1, 1), record(2, 2)]), (2, vec![record(3, 3)])] {
            let mock = server
                .mock("GET", "/dashboard/api/measurements/")
                .match_query(Matcher::UrlEncoded("page".into(), page.to_string()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(json!({"count": 3, "results": records}).to_string())
                .create_async()
                .await;
            pages.push(mock);
        }

        let client = connect(&server, None).await;
        let history = HistoryFetcher::new(&client, 8)
            .fetch("cfht", "AM1", Window::All)
            .await
            .unwrap();

        assert_eq!(history.ci_ids, vec![1, 2, 3]);
        assert_eq!(history.values, vec![0.1, 0.2, 0.3]);
        assert_eq!(
            history.package_urls[2],
            vec!["https://github.com/lsst/afw/commit/c3"]
        );
    }

    #[tokio::test]
    async fn test_metrics_follow_next_links_and_decode_encoded_specs() {
        let (mut server, _root) = server_with_root(false).await;
        let base = server.url();
        let _mock = server
            .mock("GET", "/dashboard/api/metrics/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "count": 2,
                    "next": format!("{base}/dashboard/api/metrics/?page=2"),
                    "results": [{"metric": "AM1", "unit": "marcsec", "description": "d",
                                 "specs": "[{\"name\": \"design\", \"value\": 10.0}]"}],
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/dashboard/api/metrics/")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "count": 2,
                    "next": null,
                    "results": [{"metric": "PA1", "unit": "mmag", "description": "d",
                                 "specs": [{"name": "stretch", "value": 3.0}]}],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = connect(&server, None).await;

        let metrics = client.metrics().await.unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].threshold("design"), Some(10.0));
        assert_eq!(metrics[1].threshold("stretch"), Some(3.0));

        let pa1 = MetricSource::metric(&client, "PA1").await.unwrap().unwrap();
        assert_eq!(pa1.unit, "mmag");
        assert!(MetricSource::metric(&client, "XX9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_errors_surface_as_api_errors() {
        let (mut server, _root) = server_with_root(false).await;
        let _mock = server
            .mock("GET", "/dashboard/api/datasets/")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = connect(&server, None).await;
        let result = DashboardSource::datasets(&client).await;

        assert!(matches!(
            result,
            Err(SquashError::ApiError { status: 503, message }) if message == "maintenance"
        ));
    }

    #[tokio::test]
    async fn test_submit_job_sends_bearer_token() {
        let (mut server, _root) = server_with_root(false).await;
        let mock = server
            .mock("POST", "/dashboard/api/jobs/")
            .match_header("authorization", "Bearer s3cret")
            .match_body(Matcher::PartialJson(json!({"ci_id": "452", "ci_dataset": "cfht"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(json!({"ci_id": "452", "ci_dataset": "cfht", "date": "2017-03-01T12:00:00Z"}).to_string())
            .create_async()
            .await;

        let client = connect(&server, Some(Token::from("s3cret"))).await;
        let job: NewJob = serde_json::from_value(json!({
            "ci_id": "452",
            "ci_dataset": "cfht",
            "measurements": [{"metric": "AM1", "value": 3.0}],
        }))
        .unwrap();

        let receipt = client.submit_job(&job).await.unwrap();

        mock.assert_async().await;
        assert_eq!(receipt.ci_id, "452");
        assert!(receipt.date.is_some());
    }

    #[tokio::test]
    async fn test_rejected_submission_is_a_validation_error() {
        let (mut server, _root) = server_with_root(false).await;
        let _mock = server
            .mock("POST", "/dashboard/api/jobs/")
            .with_status(400)
            .with_body(r#"{"measurements": ["unknown metric XX9"]}"#)
            .create_async()
            .await;

        let client = connect(&server, None).await;
        let job: NewJob =
            serde_json::from_value(json!({"ci_id": "452", "ci_dataset": "cfht"})).unwrap();

        let result = client.submit_job(&job).await;

        assert!(matches!(result, Err(SquashError::Validation(msg)) if msg.contains("XX9")));
    }

    #[tokio::test]
    async fn test_defaults_come_from_the_api_when_served() {
        let (mut server, _root) = server_with_root(true).await;
        let _mock = server
            .mock("GET", "/dashboard/api/defaults/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"ci_id": "452", "ci_dataset": "hsc", "metric": "PA1", "window": "weeks"}).to_string())
            .create_async()
            .await;

        let client = connect(&server, None).await;
        let defaults = client.defaults().await.unwrap();

        assert_eq!(defaults.ci_dataset.as_deref(), Some("hsc"));
        assert_eq!(defaults.metric.as_deref(), Some("PA1"));
        assert_eq!(defaults.window, Window::Weeks);
    }

    #[tokio::test]
    async fn test_defaults_are_derived_without_an_endpoint() {
        let (mut server, _root) = server_with_root(false).await;
        let _mock = server
            .mock("GET", "/dashboard/api/datasets/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"["decam", "cfht"]"#)
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/dashboard/api/metrics/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"count": 2, "results": [{"metric": "PA1"}, {"metric": "AD1"}]}).to_string())
            .create_async()
            .await;

        let client = connect(&server, None).await;
        let defaults = client.defaults().await.unwrap();

        assert_eq!(defaults.ci_dataset.as_deref(), Some("cfht"));
        assert_eq!(defaults.metric.as_deref(), Some("AD1"));
        assert_eq!(defaults.window, Window::Months);
    }
}
