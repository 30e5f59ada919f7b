// ABOUTME: HTTP client for the tracker issues API
// ABOUTME: Attaches organization and OAuth headers, maps non-2xx answers to transport errors

use reqwest::{Client, Method, RequestBuilder, Response};

use crate::config::TrackerConfig;
use crate::error::{Result, SyncError};
use crate::utils::url_for_log;

pub(crate) const SERVICE: &str = "tracker";

/// Which header carries the organization id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrgHeader {
    /// `X-Org-ID`, for standalone tracker organizations.
    #[default]
    Org,
    /// `X-Cloud-Org-ID`, for cloud organizations.
    Cloud,
}

impl OrgHeader {
    pub fn name(&self) -> &'static str {
        match self {
            OrgHeader::Org => "X-Org-ID",
            OrgHeader::Cloud => "X-Cloud-Org-ID",
        }
    }
}

pub struct TrackerClient {
    client: Client,
    config: TrackerConfig,
}

impl TrackerClient {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| SyncError::Request {
                service: SERVICE,
                source,
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Absolute URL for a path below the issues endpoint.
    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Request with the organization and authorization headers set.
    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(self.config.org_header.name(), &self.config.org_id)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("OAuth {}", self.config.oauth_token),
            )
    }

    /// Send a request, turning connection failures and non-2xx statuses into errors.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|source| SyncError::Request {
            service: SERVICE,
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let url = url_for_log(response.url().as_str());
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, url = %url, "tracker request failed");
            return Err(SyncError::Transport {
                service: SERVICE,
                status,
                body,
            });
        }

        Ok(response)
    }
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    response.json::<T>().await.map_err(|source| SyncError::Request {
        service: SERVICE,
        source,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::tracker_config;
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_join() {
        let client = TrackerClient::new(tracker_config("https://tracker.example/v2/issues/")).unwrap();
        assert_eq!(
            client.url("/_search"),
            "https://tracker.example/v2/issues/_search"
        );
        assert_eq!(
            client.url("OPS-1/changelog"),
            "https://tracker.example/v2/issues/OPS-1/changelog"
        );
    }

    #[test]
    fn test_org_header_names() {
        assert_eq!(OrgHeader::Org.name(), "X-Org-ID");
        assert_eq!(OrgHeader::Cloud.name(), "X-Cloud-Org-ID");
    }

    #[tokio::test]
    async fn sends_org_and_oauth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("X-Org-ID", "org-42"))
            .and(header("Authorization", "OAuth secret-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = TrackerClient::new(tracker_config(&server.uri())).unwrap();
        let request = client.request(Method::GET, &client.url("ping"));
        client.send(request).await.unwrap();
    }

    #[tokio::test]
    async fn cloud_org_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Cloud-Org-ID", "org-42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = tracker_config(&server.uri());
        config.org_header = OrgHeader::Cloud;
        let client = TrackerClient::new(config).unwrap();
        let request = client.request(Method::GET, &client.url("ping"));
        client.send(request).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = TrackerClient::new(tracker_config(&server.uri())).unwrap();
        let request = client.request(Method::GET, &client.url("ping"));
        match client.send(request).await.unwrap_err() {
            SyncError::Transport {
                service,
                status,
                body,
            } => {
                assert_eq!(service, "tracker");
                assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected Transport error, got: {other:?}"),
        }
    }
}
