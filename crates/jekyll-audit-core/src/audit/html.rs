//! Per-page HTML validation against a Nu HTML Checker endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AuditKind, AuditResult, AuditRunner, AuditScope};
use crate::error::{AuditError, Result};

const USER_AGENT: &str = concat!("jekyll-audit/", env!("CARGO_PKG_VERSION"));

/// One validator message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlMessage {
    /// `error`, `warning` or `info`.
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_column: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
}

impl HtmlMessage {
    pub fn is_error(&self) -> bool {
        self.message_type == "error"
    }
}

/// Validation result for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlPage {
    pub url: String,
    pub error_count: usize,
    pub messages: Vec<HtmlMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HtmlPage {
    pub fn validated(url: impl Into<String>, messages: Vec<HtmlMessage>) -> Self {
        Self {
            url: url.into(),
            error_count: messages.iter().filter(|m| m.is_error()).count(),
            messages,
            error: None,
        }
    }

    /// Placeholder for a page that could not be validated; counts as one error.
    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            url: url.into(),
            error_count: 1,
            messages: vec![HtmlMessage {
                message_type: "error".to_string(),
                message: message.clone(),
                extract: None,
                last_line: None,
                last_column: None,
                sub_type: None,
            }],
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmlReport {
    pub pages: Vec<HtmlPage>,
}

impl HtmlReport {
    /// Headline metric.
    pub fn total_errors(&self) -> usize {
        self.pages.iter().map(|p| p.error_count).sum()
    }

    pub fn summary_projection(&self) -> Value {
        Value::Array(
            self.pages
                .iter()
                .map(|p| json!({ "url": p.url, "errorCount": p.error_count }))
                .collect(),
        )
    }

    pub fn full_projection(&self) -> Value {
        serde_json::to_value(&self.pages).unwrap_or(Value::Null)
    }
}

/// Validates the markup served at one URL.
#[async_trait]
pub trait HtmlValidator: Send + Sync {
    async fn validate(&self, url: &str) -> Result<Vec<HtmlMessage>>;
}

#[derive(Debug, Deserialize)]
struct NuResponse {
    #[serde(default)]
    messages: Vec<HtmlMessage>,
}

/// [`HtmlValidator`] that fetches the page and posts it to a Nu checker.
#[derive(Debug, Clone)]
pub struct NuHtmlValidator {
    client: Client,
    endpoint: Url,
}

impl NuHtmlValidator {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| AuditError::Config(format!("invalid validator URL '{}': {}", endpoint, e)))?;
        endpoint.query_pairs_mut().append_pair("out", "json");

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl HtmlValidator for NuHtmlValidator {
    async fn validate(&self, url: &str) -> Result<Vec<HtmlMessage>> {
        let markup = self.fetch(url).await?;
        debug!(url = %url, bytes = markup.len(), "Submitting page for validation");

        let response: NuResponse = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .body(markup)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.messages)
    }
}

/// Validates every target; a failing target becomes a placeholder.
pub struct HtmlAudit {
    validator: Arc<dyn HtmlValidator>,
}

impl HtmlAudit {
    pub fn new(validator: Arc<dyn HtmlValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl AuditRunner for HtmlAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Html
    }

    async fn run(&self, scope: &AuditScope<'_>) -> Result<AuditResult> {
        let mut pages = Vec::with_capacity(scope.targets.len());
        for url in scope.targets {
            match self.validator.validate(url).await {
                Ok(messages) => pages.push(HtmlPage::validated(url.as_str(), messages)),
                Err(e) => {
                    warn!(url = %url, error = %e, "HTML validation failed");
                    pages.push(HtmlPage::failed(url.as_str(), e.to_string()));
                }
            }
        }
        Ok(AuditResult::Html(HtmlReport { pages }))
    }
}
