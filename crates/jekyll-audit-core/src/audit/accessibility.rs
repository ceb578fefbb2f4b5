//! Per-page accessibility checks via pa11y.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AuditKind, AuditResult, AuditRunner, AuditScope};
use crate::error::{AuditError, Result};
use crate::options::RunOptions;
use crate::process::{capture, CommandSpec};

/// Code given to the issue that stands in for a page that could not be checked.
pub const PLACEHOLDER_CODE: &str = "ERROR";

/// One accessibility issue as reported by the checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A11yIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// `error`, `warning` or `notice`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_code: Option<i64>,
}

impl A11yIssue {
    fn placeholder(message: impl Into<String>) -> Self {
        Self {
            code: PLACEHOLDER_CODE.to_string(),
            message: message.into(),
            context: None,
            selector: None,
            issue_type: Some("error".to_string()),
            type_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A11ySettings {
    /// Standard name, e.g. `WCAG2AA`.
    pub standard: String,
    pub timeout_ms: u64,
}

impl A11ySettings {
    pub fn from_options(options: &RunOptions) -> Self {
        Self {
            standard: options.accessibility.standard.clone(),
            timeout_ms: options.accessibility.timeout_ms,
        }
    }
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct A11yPage {
    pub url: String,
    pub issues: Vec<A11yIssue>,
    /// Set when the page could not be checked; `issues` then holds one placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl A11yPage {
    pub fn checked(url: impl Into<String>, issues: Vec<A11yIssue>) -> Self {
        Self {
            url: url.into(),
            issues,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            url: url.into(),
            issues: vec![A11yIssue::placeholder(message.clone())],
            error: Some(message),
        }
    }

    pub fn total(&self) -> usize {
        self.issues.len()
    }

    /// Issue counts by type. Unknown types are counted in `total` only.
    pub fn by_type(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::from([("error", 0), ("warning", 0), ("notice", 0)]);
        for issue in &self.issues {
            let kind = issue
                .issue_type
                .as_deref()
                .unwrap_or_default()
                .to_ascii_lowercase();
            let key = match kind.as_str() {
                "error" => "error",
                "warning" => "warning",
                "notice" => "notice",
                _ => continue,
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

/// Accessibility results for every target, in target order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessibilityReport {
    pub pages: Vec<A11yPage>,
}

impl AccessibilityReport {
    /// Headline metric; placeholders count as one issue each.
    pub fn total_issues(&self) -> usize {
        self.pages.iter().map(A11yPage::total).sum()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.error.is_some()).count()
    }

    pub fn summary_projection(&self) -> Value {
        let per_page: Vec<Value> = self
            .pages
            .iter()
            .map(|p| {
                json!({
                    "url": p.url,
                    "total": p.total(),
                    "byType": p.by_type(),
                })
            })
            .collect();
        json!({
            "pages": self.pages.len(),
            "totalIssues": self.total_issues(),
            "perPage": per_page,
        })
    }

    pub fn full_projection(&self) -> Value {
        serde_json::to_value(&self.pages).unwrap_or(Value::Null)
    }
}

/// Checks one page.
#[async_trait]
pub trait AccessibilityChecker: Send + Sync {
    async fn check(&self, url: &str, settings: &A11ySettings) -> Result<Vec<A11yIssue>>;
}

/// [`AccessibilityChecker`] backed by the `pa11y` CLI.
#[derive(Debug, Clone)]
pub struct Pa11yCli {
    program: String,
    timeout_secs: u64,
}

impl Pa11yCli {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    pub fn args(url: &str, settings: &A11ySettings) -> Vec<String> {
        vec![
            "--reporter".to_string(),
            "json".to_string(),
            "--standard".to_string(),
            settings.standard.clone(),
            "--timeout".to_string(),
            settings.timeout_ms.to_string(),
            url.to_string(),
        ]
    }

    /// pa11y exits 2 when it found issues; that is still a valid report.
    fn accepted_exit(code: i32) -> bool {
        code == 0 || code == 2
    }
}

#[async_trait]
impl AccessibilityChecker for Pa11yCli {
    async fn check(&self, url: &str, settings: &A11ySettings) -> Result<Vec<A11yIssue>> {
        let spec = CommandSpec::new(&self.program, Self::args(url, settings));
        let output = capture("pa11y", &spec, self.timeout_secs).await?;
        if !Self::accepted_exit(output.exit_code) {
            return Err(AuditError::ToolFailed {
                tool: "pa11y".to_string(),
                message: output.failure_message(),
            });
        }
        if output.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&output.stdout).map_err(|source| AuditError::ToolOutput {
            tool: "pa11y".to_string(),
            source,
        })
    }
}

/// Runs the checker against every target; a failing target becomes a placeholder.
pub struct AccessibilityAudit {
    checker: Arc<dyn AccessibilityChecker>,
    settings: A11ySettings,
}

impl AccessibilityAudit {
    pub fn new(checker: Arc<dyn AccessibilityChecker>, settings: A11ySettings) -> Self {
        Self { checker, settings }
    }
}

#[async_trait]
impl AuditRunner for AccessibilityAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Accessibility
    }

    async fn run(&self, scope: &AuditScope<'_>) -> Result<AuditResult> {
        let mut pages = Vec::with_capacity(scope.targets.len());
        for url in scope.targets {
            match self.checker.check(url, &self.settings).await {
                Ok(issues) => {
                    debug!(url = %url, issues = issues.len(), "Accessibility check finished");
                    pages.push(A11yPage::checked(url.as_str(), issues));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Accessibility check failed");
                    pages.push(A11yPage::failed(url.as_str(), e.to_string()));
                }
            }
        }
        Ok(AuditResult::Accessibility(AccessibilityReport { pages }))
    }
}
