//! Search-Console client (§4.3b, §6): batched URL-Inspection and per-page
//! Search-Analytics. Non-fatal on failure; callers fall back to sequential
//! inspection or simply skip analytics enrichment.

use crate::models::{GscQuery, IndexState, SearchAnalytics};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

const MAX_BATCH_URLS: usize = 100;

pub struct SearchConsoleClient {
    http: Client,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchConsoleError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("response parse error: {0}")]
    Parse(String),
}

impl SearchConsoleClient {
    pub fn new(timeout_secs: u64) -> Self {
        let http = Client::builder().build().expect("failed to build search-console HTTP client");
        Self { http, timeout: Duration::from_secs(timeout_secs) }
    }

    /// Batch URL-Inspection (§4.3, step 1): one request for up to 100 URLs.
    /// On failure the caller falls back to per-URL calls.
    pub async fn batch_inspect(
        &self,
        site_url: &str,
        urls: &[String],
    ) -> Result<HashMap<String, IndexState>, SearchConsoleError> {
        let batch: Vec<&String> = urls.iter().take(MAX_BATCH_URLS).collect();
        let mut results = HashMap::new();

        // The real URL-Inspection API has no true multi-URL batch endpoint;
        // Google's batch transport is HTTP multipart over the single-URL
        // endpoint. We model this as one logical call per URL within a
        // single outer request boundary, any failure in the outer call
        // aborts the whole batch (handled by the caller's fallback).
        for url in batch {
            match self.inspect_one(site_url, url).await {
                Ok(state) => {
                    results.insert(url.clone(), state);
                },
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    pub async fn inspect_one(
        &self,
        site_url: &str,
        url: &str,
    ) -> Result<IndexState, SearchConsoleError> {
        let endpoint = format!(
            "https://searchconsole.googleapis.com/v1/urlInspection/index:inspect"
        );
        let body = serde_json::json!({ "inspectionUrl": url, "siteUrl": site_url });

        let response = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchConsoleError::Transport(e.to_string()))?;

        let json: serde_json::Value =
            response.json().await.map_err(|e| SearchConsoleError::Parse(e.to_string()))?;

        let result = &json["inspectionResult"]["indexStatusResult"];
        let verdict = result["verdict"].as_str().unwrap_or("UNKNOWN").to_string();
        let coverage_state = result["coverageState"].as_str().unwrap_or_default().to_string();

        Ok(IndexState { is_indexed: verdict == "PASS", verdict, coverage_state })
    }

    /// Page-scoped Search-Analytics query: page URL + 30-day window grouped
    /// by query (§4.3c). Failures are non-fatal to the caller.
    pub async fn search_analytics(
        &self,
        site_url: &str,
        page_url: &str,
    ) -> Result<SearchAnalytics, SearchConsoleError> {
        let end = chrono::Utc::now().date_naive();
        let start = end - chrono::Duration::days(30);

        let endpoint = format!(
            "https://searchconsole.googleapis.com/webmasters/v3/sites/{}/searchAnalytics/query",
            urlencode(site_url)
        );
        let body = serde_json::json!({
            "startDate": start.to_string(),
            "endDate": end.to_string(),
            "dimensions": ["query"],
            "dimensionFilterGroups": [{
                "filters": [{"dimension": "page", "operator": "equals", "expression": page_url}]
            }],
        });

        let response = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchConsoleError::Transport(e.to_string()))?;

        let json: serde_json::Value =
            response.json().await.map_err(|e| SearchConsoleError::Parse(e.to_string()))?;

        let rows = json["rows"].as_array().cloned().unwrap_or_default();
        let mut impressions = 0i64;
        let mut clicks = 0i64;
        let mut position_sum = 0.0;
        let mut top_queries = Vec::new();

        for row in &rows {
            let row_impressions = row["impressions"].as_i64().unwrap_or(0);
            let row_clicks = row["clicks"].as_i64().unwrap_or(0);
            let row_position = row["position"].as_f64().unwrap_or(0.0);
            impressions += row_impressions;
            clicks += row_clicks;
            position_sum += row_position * row_impressions as f64;

            if let Some(query) = row["keys"][0].as_str() {
                top_queries.push(GscQuery {
                    query: query.to_string(),
                    impressions: row_impressions,
                    clicks: row_clicks,
                });
            }
        }

        top_queries.sort_by(|a, b| b.impressions.cmp(&a.impressions));
        top_queries.truncate(15);

        let ctr = if impressions > 0 { clicks as f64 / impressions as f64 } else { 0.0 };
        let avg_position = if impressions > 0 { position_sum / impressions as f64 } else { 0.0 };

        Ok(SearchAnalytics { impressions, clicks, ctr, avg_position, top_queries })
    }
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            },
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_scheme_and_slashes() {
        assert_eq!(urlencode("https://example.com/"), "https%3A%2F%2Fexample.com%2F");
    }
}
