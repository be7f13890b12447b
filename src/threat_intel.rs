//! External URL reputation lookups.
//!
//! The lookup is fail-open: transport errors, timeouts, missing credentials
//! and "no record" answers all come back as not flagged. Nothing in here is
//! retried within a request.

use crate::config::ThreatIntelConfig;
use crate::verdict::{Finding, ThreatIntelVerdict};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait ThreatIntel: Send + Sync {
    fn name(&self) -> &str;

    /// Never fails; provider problems map to [`ThreatIntelVerdict::not_flagged`].
    async fn lookup(&self, url: &str) -> ThreatIntelVerdict;
}

#[derive(Debug, thiserror::Error)]
pub enum ThreatIntelError {
    #[error("API key not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed report: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Vendor counts from the last provider analysis of a URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AnalysisStats {
    #[serde(default)]
    pub malicious: u32,
    #[serde(default)]
    pub suspicious: u32,
    #[serde(default)]
    pub harmless: u32,
    #[serde(default)]
    pub undetected: u32,
}

impl AnalysisStats {
    pub fn to_verdict(self) -> ThreatIntelVerdict {
        if self.malicious == 0 {
            return ThreatIntelVerdict::not_flagged();
        }
        let vendors = if self.malicious == 1 { "vendor" } else { "vendors" };
        ThreatIntelVerdict::flagged(Finding::new(format!(
            "Flagged as malicious by {} security {vendors} on VirusTotal.",
            self.malicious
        )))
    }
}

#[derive(Debug, Deserialize)]
struct UrlReport {
    data: UrlReportData,
}

#[derive(Debug, Deserialize)]
struct UrlReportData {
    attributes: UrlReportAttributes,
}

#[derive(Debug, Deserialize)]
struct UrlReportAttributes {
    #[serde(default)]
    last_analysis_stats: AnalysisStats,
}

/// VirusTotal v3 URL report client.
#[derive(Debug, Clone)]
pub struct VirusTotalClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    submit_unknown: bool,
}

impl VirusTotalClient {
    pub fn new(config: &ThreatIntelConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("SafeTabGuard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            submit_unknown: config.submit_unknown,
        })
    }

    /// Override the overall lookup deadline (the HTTP client keeps its own).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provider identifier of a URL: unpadded URL-safe base64.
    pub fn url_id(url: &str) -> String {
        URL_SAFE_NO_PAD.encode(url)
    }

    /// `Ok(None)` when the provider has no record of the URL yet.
    pub async fn fetch_stats(&self, url: &str) -> Result<Option<AnalysisStats>, ThreatIntelError> {
        let api_key = self.api_key.as_deref().ok_or(ThreatIntelError::NotConfigured)?;
        let endpoint = format!("{}/urls/{}", self.base_url, Self::url_id(url));

        tokio::time::timeout(self.timeout, self.request_stats(api_key, &endpoint))
            .await
            .map_err(|_| ThreatIntelError::Timeout(self.timeout))?
    }

    async fn request_stats(
        &self,
        api_key: &str,
        endpoint: &str,
    ) -> Result<Option<AnalysisStats>, ThreatIntelError> {
        let response = self
            .client
            .get(endpoint)
            .header("x-apikey", api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await?;
                let report: UrlReport = serde_json::from_slice(&body)?;
                Ok(Some(report.data.attributes.last_analysis_stats))
            }
            status => Err(ThreatIntelError::Status(status.as_u16())),
        }
    }

    /// Queue an unknown URL for scanning without holding up the caller.
    fn submit_in_background(&self, url: &str) {
        let Some(api_key) = self.api_key.clone() else {
            return;
        };
        let client = self.client.clone();
        let endpoint = format!("{}/urls", self.base_url);
        let url = url.to_string();

        tokio::spawn(async move {
            let result = client
                .post(&endpoint)
                .header("x-apikey", api_key)
                .form(&[("url", url.as_str())])
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    log::debug!("Submitted {url} to VirusTotal for scanning");
                }
                Ok(response) => {
                    log::debug!(
                        "VirusTotal submission for {url} returned {}",
                        response.status()
                    );
                }
                Err(e) => log::debug!("VirusTotal submission for {url} failed: {e}"),
            }
        });
    }
}

#[async_trait]
impl ThreatIntel for VirusTotalClient {
    fn name(&self) -> &str {
        "virustotal"
    }

    async fn lookup(&self, url: &str) -> ThreatIntelVerdict {
        match self.fetch_stats(url).await {
            Ok(Some(stats)) => {
                log::debug!(
                    "VirusTotal report for {url}: {} malicious, {} suspicious, {} harmless, {} undetected",
                    stats.malicious,
                    stats.suspicious,
                    stats.harmless,
                    stats.undetected
                );
                let verdict = stats.to_verdict();
                if verdict.flagged {
                    log::info!(
                        "VirusTotal flagged URL as malicious: {url} ({} vendors)",
                        stats.malicious
                    );
                }
                verdict
            }
            Ok(None) => {
                log::debug!("VirusTotal has no record of {url}");
                if self.submit_unknown {
                    self.submit_in_background(url);
                }
                ThreatIntelVerdict::not_flagged()
            }
            Err(ThreatIntelError::NotConfigured) => {
                log::warn!("VirusTotal API key not found. Skipping check.");
                ThreatIntelVerdict::not_flagged()
            }
            Err(e) => {
                log::warn!("VirusTotal lookup for {url} failed: {e}");
                ThreatIntelVerdict::not_flagged()
            }
        }
    }
}

/// Stand-in used when threat-intel lookups are switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledThreatIntel;

#[async_trait]
impl ThreatIntel for DisabledThreatIntel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn lookup(&self, _url: &str) -> ThreatIntelVerdict {
        ThreatIntelVerdict::not_flagged()
    }
}
