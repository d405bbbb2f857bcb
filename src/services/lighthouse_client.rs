//! Lighthouse/PageSpeed client (§4.3, §6). One HTTP call per page per
//! strategy; retried with exponential backoff on 5xx/timeout/connection
//! error, never on 4xx, with a longer backoff on 429.

use crate::models::{CoreWebVitals, LighthouseScores};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Mobile,
    Desktop,
}

impl Strategy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
        }
    }
}

pub struct LighthouseClient {
    http: Client,
    api_base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum LighthouseError {
    #[error("client error (status {0})")]
    Client(u16),
    #[error("server error (status {0})")]
    Server(u16),
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("response parse error: {0}")]
    Parse(String),
}

impl LighthouseError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server(_) | Self::RateLimited(_) | Self::Transport(_))
    }
}

impl LighthouseClient {
    pub fn new(api_base_url: String, api_key: Option<String>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .build()
            .expect("failed to build lighthouse HTTP client");
        Self { http, api_base_url, api_key, timeout: Duration::from_secs(timeout_secs) }
    }

    /// Fetch category scores and Core Web Vitals for `url` under `strategy`,
    /// retrying up to 3 attempts total with exponential backoff (§4.3a).
    pub async fn fetch(
        &self,
        url: &str,
        strategy: Strategy,
    ) -> Result<(LighthouseScores, CoreWebVitals, bool), LighthouseError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_once(url, strategy).await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() || attempt >= 3 => return Err(e),
                Err(e) => {
                    let backoff = match &e {
                        LighthouseError::RateLimited(secs) => Duration::from_secs(*secs),
                        _ => Duration::from_millis(500 * 2u64.pow(attempt - 1)),
                    };
                    warn!("lighthouse fetch attempt {} failed for {}: {}; retrying in {:?}", attempt, url, e, backoff);
                    tokio::time::sleep(backoff).await;
                },
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        strategy: Strategy,
    ) -> Result<(LighthouseScores, CoreWebVitals, bool), LighthouseError> {
        let mut request = self
            .http
            .get(format!("{}/runPagespeed", self.api_base_url.trim_end_matches('/')))
            .timeout(self.timeout)
            .query(&[("url", url), ("strategy", strategy.as_str())])
            .query(&[
                ("category", "seo"),
                ("category", "performance"),
                ("category", "accessibility"),
                ("category", "best-practices"),
                ("category", "pwa"),
            ]);

        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LighthouseError::Transport(format!("timeout: {e}"))
            } else {
                LighthouseError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LighthouseError::RateLimited(retry_after));
        }
        if status.is_server_error() {
            return Err(LighthouseError::Server(status.as_u16()));
        }
        if !status.is_success() {
            return Err(LighthouseError::Client(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(|e| LighthouseError::Parse(e.to_string()))?;
        Ok(parse_response(&body))
    }
}

fn parse_response(body: &Value) -> (LighthouseScores, CoreWebVitals, bool) {
    let categories = &body["lighthouseResult"]["categories"];
    let audits = &body["lighthouseResult"]["audits"];

    let score = |key: &str| -> Option<f64> {
        categories[key]["score"].as_f64().map(|s| (s * 100.0).round())
    };
    let numeric = |key: &str| -> Option<f64> { audits[key]["numericValue"].as_f64() };

    let scores = LighthouseScores {
        seo: score("seo"),
        performance: score("performance"),
        accessibility: score("accessibility"),
        best_practices: score("best-practices"),
        pwa: score("pwa"),
    };

    let cwv = CoreWebVitals {
        lcp: numeric("largest-contentful-paint"),
        fid: numeric("max-potential-fid"),
        cls: numeric("cumulative-layout-shift"),
        fcp: numeric("first-contentful-paint"),
        tti: numeric("interactive"),
        tbt: numeric("total-blocking-time"),
    };

    let mobile_friendly = audits["viewport"]["score"].as_f64().map(|s| s >= 1.0).unwrap_or(true);

    debug!("parsed lighthouse response: seo={:?}", scores.seo);
    (scores, cwv, mobile_friendly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scores_and_cwv() {
        let body = json!({
            "lighthouseResult": {
                "categories": {
                    "seo": {"score": 0.92},
                    "performance": {"score": 0.5},
                    "accessibility": {"score": 1.0},
                    "best-practices": {"score": 0.8},
                    "pwa": {"score": 0.3}
                },
                "audits": {
                    "largest-contentful-paint": {"numericValue": 2500.0},
                    "max-potential-fid": {"numericValue": 100.0},
                    "cumulative-layout-shift": {"numericValue": 0.05},
                    "first-contentful-paint": {"numericValue": 1200.0},
                    "interactive": {"numericValue": 3000.0},
                    "total-blocking-time": {"numericValue": 50.0},
                    "viewport": {"score": 1.0}
                }
            }
        });
        let (scores, cwv, mobile_friendly) = parse_response(&body);
        assert_eq!(scores.seo, Some(92.0));
        assert_eq!(scores.performance, Some(50.0));
        assert_eq!(cwv.lcp, Some(2500.0));
        assert!(mobile_friendly);
    }

    #[tokio::test]
    async fn retries_on_server_error_then_succeeds() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = json!({
            "lighthouseResult": {
                "categories": {
                    "seo": {"score": 1.0},
                    "performance": {"score": 1.0},
                    "accessibility": {"score": 1.0},
                    "best-practices": {"score": 1.0},
                    "pwa": {"score": 1.0}
                },
                "audits": {
                    "largest-contentful-paint": {"numericValue": 1000.0},
                    "max-potential-fid": {"numericValue": 10.0},
                    "cumulative-layout-shift": {"numericValue": 0.0},
                    "first-contentful-paint": {"numericValue": 500.0},
                    "interactive": {"numericValue": 1500.0},
                    "total-blocking-time": {"numericValue": 5.0},
                    "viewport": {"score": 1.0}
                }
            }
        });

        Mock::given(method("GET"))
            .and(path("/runPagespeed"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runPagespeed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::new(server.uri(), None, 5);
        let (scores, _, _) = client.fetch("https://example.com/", Strategy::Mobile).await.unwrap();
        assert_eq!(scores.seo, Some(100.0));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/runPagespeed"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = LighthouseClient::new(server.uri(), None, 5);
        let err = client.fetch("https://example.com/", Strategy::Mobile).await.unwrap_err();
        assert!(matches!(err, LighthouseError::Client(404)));
    }
}
