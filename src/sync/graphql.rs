use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

/// Timeout for a single GraphQL request (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes GraphQL queries and returns the `data` object of the response.
#[async_trait]
pub trait GraphQlTransport: Send + Sync {
    async fn query(&self, query: &str, variables: Value) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// HTTP POST transport for a subgraph endpoint.
#[derive(Clone)]
pub struct HttpGraphQlClient {
    client: reqwest::Client,
    url: Url,
}

impl HttpGraphQlClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).context("Invalid GraphQL endpoint URL")?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl GraphQlTransport for HttpGraphQlClient {
    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("GraphQL request failed")?
            .error_for_status()
            .context("GraphQL endpoint returned an error status")?;

        let body: GraphQlResponse = response
            .json()
            .await
            .context("Failed to decode GraphQL response")?;

        into_data(body)
    }
}

/// A response carrying `errors` is a failure even when partial `data` is present.
fn into_data(body: GraphQlResponse) -> Result<Value> {
    if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        bail!("GraphQL errors: {}", messages.join("; "));
    }

    body.data.ok_or_else(|| anyhow!("GraphQL response has no data"))
}
