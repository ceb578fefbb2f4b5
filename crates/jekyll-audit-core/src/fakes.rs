//! In-memory fakes for the collaborator traits (testing only)
//!
//! Each fake records the URLs (or commands) it was called with so tests can
//! assert on ordering and coverage without spawning any real tool.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::audit::{
    A11yIssue, A11ySettings, AccessibilityChecker, HtmlMessage, HtmlValidator, LighthouseRun,
    LinkCheckSettings, LinkChecker, LinkEntry, LinkState, PerformanceScorer, ScoreRequest,
};
use crate::error::{AuditError, Result};
use crate::process::{CommandRunner, CommandSpec};

// ---------------------------------------------------------------------------
// RecordingCommandRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum CommandBehaviour {
    Exit(Option<i32>),
    SpawnError,
}

/// Records every command and returns a fixed exit status.
#[derive(Debug)]
pub struct RecordingCommandRunner {
    behaviour: CommandBehaviour,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingCommandRunner {
    pub fn succeeding() -> Self {
        Self::exiting(0)
    }

    pub fn exiting(code: i32) -> Self {
        Self {
            behaviour: CommandBehaviour::Exit(Some(code)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Behaves like a program that was killed by a signal.
    pub fn killed() -> Self {
        Self {
            behaviour: CommandBehaviour::Exit(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Behaves like a program that does not exist.
    pub fn unspawnable() -> Self {
        Self {
            behaviour: CommandBehaviour::SpawnError,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn status(&self, spec: &CommandSpec) -> std::io::Result<Option<i32>> {
        self.calls.lock().unwrap().push(spec.clone());
        match self.behaviour {
            CommandBehaviour::Exit(code) => Ok(code),
            CommandBehaviour::SpawnError => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: not found", spec.program),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeScorer
// ---------------------------------------------------------------------------

/// Returns a canned Lighthouse report, or a fixed error.
#[derive(Debug)]
pub struct FakeScorer {
    outcome: std::result::Result<Value, String>,
    urls: Mutex<Vec<String>>,
}

impl FakeScorer {
    /// Report with the given category scores (`None` ⇒ `"score": null`).
    pub fn with_scores(scores: &[(&str, Option<f64>)]) -> Self {
        let categories: Map<String, Value> = scores
            .iter()
            .map(|(id, score)| ((*id).to_string(), json!({ "id": id, "score": score })))
            .collect();
        Self::with_report(json!({
            "lighthouseVersion": "fake",
            "requestedUrl": "",
            "finalUrl": "",
            "categories": categories,
            "audits": {},
        }))
    }

    pub fn with_report(report: Value) -> Self {
        Self {
            outcome: Ok(report),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PerformanceScorer for FakeScorer {
    async fn score(&self, url: &str, _request: &ScoreRequest) -> Result<LighthouseRun> {
        self.urls.lock().unwrap().push(url.to_string());
        match &self.outcome {
            Ok(report) => Ok(LighthouseRun::from_report(report.clone())),
            Err(message) => Err(AuditError::ToolFailed {
                tool: "lighthouse".to_string(),
                message: message.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeAccessibilityChecker
// ---------------------------------------------------------------------------

/// Reports the same issues for every page, except pages marked as failing.
#[derive(Debug, Default)]
pub struct FakeAccessibilityChecker {
    issues: Vec<A11yIssue>,
    failing: HashSet<String>,
    urls: Mutex<Vec<String>>,
}

impl FakeAccessibilityChecker {
    /// `count` error-level issues per page.
    pub fn with_issues(count: usize) -> Self {
        let issues = (0..count)
            .map(|i| A11yIssue {
                code: format!("WCAG2AA.Fake.{}", i),
                message: "fake issue".to_string(),
                context: None,
                selector: None,
                issue_type: Some("error".to_string()),
                type_code: Some(1),
            })
            .collect();
        Self {
            issues,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccessibilityChecker for FakeAccessibilityChecker {
    async fn check(&self, url: &str, _settings: &A11ySettings) -> Result<Vec<A11yIssue>> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(AuditError::ToolFailed {
                tool: "pa11y".to_string(),
                message: format!("could not load {}", url),
            });
        }
        Ok(self.issues.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeLinkChecker
// ---------------------------------------------------------------------------

/// Returns a fixed link list, or a fixed error.
#[derive(Debug)]
pub struct FakeLinkChecker {
    outcome: std::result::Result<Vec<LinkEntry>, String>,
    urls: Mutex<Vec<String>>,
}

impl Default for FakeLinkChecker {
    fn default() -> Self {
        Self::with_links(Vec::new())
    }
}

impl FakeLinkChecker {
    pub fn with_links(links: Vec<LinkEntry>) -> Self {
        Self {
            outcome: Ok(links),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// `broken` broken links under `base_url`, plus one healthy one.
    pub fn with_broken(base_url: &str, broken: usize) -> Self {
        let base = base_url.trim_end_matches('/');
        let mut links = vec![LinkEntry {
            url: format!("{}/", base),
            status: Some(200),
            state: LinkState::Ok,
            parent: None,
        }];
        links.extend((0..broken).map(|i| LinkEntry {
            url: format!("{}/missing-{}", base, i),
            status: Some(404),
            state: LinkState::Broken,
            parent: Some(format!("{}/", base)),
        }));
        Self::with_links(links)
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkChecker for FakeLinkChecker {
    async fn check(&self, url: &str, _settings: &LinkCheckSettings) -> Result<Vec<LinkEntry>> {
        self.urls.lock().unwrap().push(url.to_string());
        match &self.outcome {
            Ok(links) => Ok(links.clone()),
            Err(message) => Err(AuditError::ToolFailed {
                tool: "linkinator".to_string(),
                message: message.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeHtmlValidator
// ---------------------------------------------------------------------------

/// Reports the same messages for every page, except pages marked as failing.
#[derive(Debug, Default)]
pub struct FakeHtmlValidator {
    messages: Vec<HtmlMessage>,
    failing: HashSet<String>,
    urls: Mutex<Vec<String>>,
}

impl FakeHtmlValidator {
    /// `count` error messages per page.
    pub fn with_errors(count: usize) -> Self {
        let messages = (0..count)
            .map(|i| HtmlMessage {
                message_type: "error".to_string(),
                message: format!("fake error {}", i),
                extract: None,
                last_line: Some(1),
                last_column: Some(1),
                sub_type: None,
            })
            .collect();
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HtmlValidator for FakeHtmlValidator {
    async fn validate(&self, url: &str) -> Result<Vec<HtmlMessage>> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(AuditError::Http(format!("GET {} failed", url)));
        }
        Ok(self.messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_runner_records_and_fails() {
        let runner = RecordingCommandRunner::unspawnable();
        let spec = CommandSpec::new("jekyll", vec!["build".to_string()]);
        assert!(runner.status(&spec).await.is_err());
        assert_eq!(runner.calls().len(), 1);

        let killed = RecordingCommandRunner::killed();
        assert_eq!(killed.status(&spec).await.expect("status"), None);
    }

    #[tokio::test]
    async fn test_fake_scorer_scores() {
        let scorer = FakeScorer::with_scores(&[("performance", Some(0.5)), ("seo", None)]);
        let request = ScoreRequest {
            categories: vec![],
            include_screenshots: false,
            skip_heavy_audits: true,
        };
        let run = scorer.score("http://s/", &request).await.expect("score");
        assert_eq!(run.score("performance"), Some(0.5));
        assert_eq!(run.categories.get("seo"), Some(&None));
    }
}
