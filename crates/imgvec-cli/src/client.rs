use std::time::Duration;

use anyhow::{Context, Result};
use common::QueryRequest;
use reqwest::blocking::Client;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Matches(serde_json::Value),
    Rejected { status: u16, body: String },
}

/// One-shot POST of a precomputed embedding; no retries.
pub struct QueryClient {
    http: Client,
    url: String,
}

impl QueryClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building http client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .with_context(|| format!("failed sending query to {}", self.url))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<serde_json::Value>()
                .context("query response was not valid JSON")?;
            return Ok(QueryOutcome::Matches(body));
        }
        let body = response.text().unwrap_or_default();
        Ok(QueryOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
