//! HTTP client for the customer GraphQL API.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::{RemoteError, RemoteSource};
use crate::config::RemoteConfig;
use crate::models::RawCustomer;

pub const LIST_CUSTOMERS_QUERY: &str = "query ListZellerCustomers { \
     listZellerCustomers { items { id name email role } nextToken } }";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ListCustomersData>,
    #[serde(default)]
    errors: Vec<GraphQlErrorItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCustomersData {
    list_zeller_customers: Option<CustomerPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerPage {
    items: Vec<RawCustomer>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorItem {
    message: String,
}

/// Fetches customers from the GraphQL endpoint, authenticating with `x-api-key`.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
}

impl GraphQlClient {
    /// Creates a client. `timeout` of `None` leaves requests unbounded.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            http,
        })
    }

    /// Creates a client from config.
    ///
    /// Returns an error if the endpoint or API key is missing.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(RemoteError::NotConfigured)?;
        let api_key = config.api_key.clone().ok_or(RemoteError::NotConfigured)?;

        Self::new(
            endpoint,
            api_key,
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_customers(&self) -> Result<Vec<RawCustomer>, RemoteError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&json!({ "query": LIST_CUSTOMERS_QUERY }))
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        parse_response(&body)
    }
}

impl RemoteSource for GraphQlClient {
    async fn fetch_all_customers(&self) -> Result<Vec<RawCustomer>, RemoteError> {
        tracing::debug!("Fetching customers from {}", self.endpoint);
        let customers = self.list_customers().await?;
        tracing::debug!("Fetched {} customer(s)", customers.len());
        Ok(customers)
    }
}

fn parse_response(body: &str) -> Result<Vec<RawCustomer>, RemoteError> {
    let response: GraphQlResponse =
        serde_json::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))?;

    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(RemoteError::GraphQl(messages.join("; ")));
    }

    let page = response
        .data
        .and_then(|data| data.list_zeller_customers)
        .ok_or_else(|| RemoteError::Malformed("missing listZellerCustomers".to_string()))?;

    // Pagination is not followed; only the first page is ever synced.
    if let Some(token) = page.next_token {
        tracing::warn!(
            "Remote returned a nextToken ({}); only the first page is synced",
            token
        );
    }

    Ok(page.items)
}
