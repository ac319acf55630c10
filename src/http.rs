use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

use crate::error::{AppError, AppResult};

pub fn build_client(timeout: Option<Duration>) -> AppResult<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Non-2xx answers are treated as transient network failures.
pub async fn ensure_success(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("Request failed with status {}: {}", status, body);
    Err(AppError::Network(format!("HTTP request failed with status: {}", status)))
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// POST a GraphQL query and return `data`. An `errors` array is a malformed response.
pub async fn post_graphql<T, V>(client: &Client, url: &str, query: &str, variables: V) -> AppResult<T>
where
    T: DeserializeOwned,
    V: Serialize,
{
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(&GraphQlRequest { query, variables })
        .send()
        .await?;

    let response = ensure_success(response).await?;
    let body: GraphQlResponse<T> = response.json().await?;

    if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(AppError::MalformedResponse(format!(
            "GraphQL errors: {}",
            messages.join("; ")
        )));
    }

    body.data
        .ok_or_else(|| AppError::MalformedResponse("GraphQL response has no data".to_string()))
}
