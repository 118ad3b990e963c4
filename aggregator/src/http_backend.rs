use crate::backend::{DiscoveryBackend, PullError};
use async_trait::async_trait;
use discovery::types::DISCOVERY_LIST_KIND;
use discovery::{DiscoveryDocument, LegacyResourceList, MediaType};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use url::Url;

/// A backend reached over HTTP. Aggregated documents are requested from
/// `<base>/apis`, legacy listings from `<base>/apis/<group>/<version>`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpBackend { client, base_url })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}{path}"));
        url
    }

    async fn get(&self, path: &str, accept: &str) -> Result<reqwest::Response, PullError> {
        let url = self.url(path);
        let host = url.host_str().unwrap_or(url.as_str()).to_string();

        self.client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| PullError::Unreachable(format!("{host}: {e}")))
    }
}

#[async_trait]
impl DiscoveryBackend for HttpBackend {
    async fn aggregated(&self) -> Result<DiscoveryDocument, PullError> {
        let accept = format!("{},application/json;q=0.9", MediaType::Json.content_type());
        let response = self.get("/apis", &accept).await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => {
                return Err(PullError::NotAggregated);
            }
            status => {
                return Err(PullError::UnexpectedResponse(format!("status {status}")));
            }
        }

        // Backends without aggregated discovery answer with a plain group list
        let aggregated = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(&format!("as={DISCOVERY_LIST_KIND}")));
        if !aggregated {
            return Err(PullError::NotAggregated);
        }

        response
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| PullError::UnexpectedResponse(e.to_string()))
    }

    async fn legacy(&self, group: &str, version: &str) -> Result<LegacyResourceList, PullError> {
        let path = format!("/apis/{group}/{version}");
        let response = self.get(&path, "application/json").await?;

        match response.status() {
            StatusCode::OK => response
                .json::<LegacyResourceList>()
                .await
                .map_err(|e| PullError::UnexpectedResponse(e.to_string())),
            StatusCode::NOT_FOUND => Err(PullError::GroupVersionNotFound {
                group: group.to_string(),
                version: version.to_string(),
            }),
            status => Err(PullError::UnexpectedResponse(format!("status {status}"))),
        }
    }
}
