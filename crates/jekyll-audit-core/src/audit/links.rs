//! Site-wide link check via linkinator.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{AuditKind, AuditResult, AuditRunner, AuditScope};
use crate::error::{AuditError, Result};
use crate::options::RunOptions;
use crate::process::{capture, CommandSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkState {
    Ok,
    Broken,
    Skipped,
    #[serde(other)]
    Other,
}

/// One checked link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub url: String,
    #[serde(default)]
    pub status: Option<u16>,
    pub state: LinkState,
    /// Page the link was found on.
    #[serde(default)]
    pub parent: Option<String>,
}

impl LinkEntry {
    pub fn is_broken(&self) -> bool {
        self.state == LinkState::Broken
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheckSettings {
    pub recurse: bool,
    pub timeout_ms: u64,
    pub concurrency: usize,
    /// Patterns of links not to check.
    pub skip: Vec<String>,
}

impl LinkCheckSettings {
    pub fn from_options(options: &RunOptions) -> Self {
        Self {
            recurse: true,
            timeout_ms: options.links.timeout_ms,
            concurrency: options.links.concurrency,
            skip: options.links.skip.clone(),
        }
    }
}

/// Link check result, already narrowed to the base origin when requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub links: Vec<LinkEntry>,
    pub internal_only: bool,
}

impl LinkReport {
    /// Build a report, keeping only same-origin links when `internal_only`.
    ///
    /// A base URL that does not parse disables the filter; a link URL that
    /// does not parse is dropped by it.
    pub fn new(base_url: &str, links: Vec<LinkEntry>, internal_only: bool) -> Self {
        let links = match (internal_only, Url::parse(base_url)) {
            (true, Ok(base)) => {
                let origin = base.origin();
                links
                    .into_iter()
                    .filter(|l| {
                        Url::parse(&l.url)
                            .map(|u| u.origin() == origin)
                            .unwrap_or(false)
                    })
                    .collect()
            }
            _ => links,
        };
        Self {
            links,
            internal_only,
        }
    }

    pub fn broken(&self) -> impl Iterator<Item = &LinkEntry> {
        self.links.iter().filter(|l| l.is_broken())
    }

    /// Headline metric.
    pub fn broken_count(&self) -> usize {
        self.broken().count()
    }

    pub fn summary_projection(&self) -> Value {
        let broken: Vec<Value> = self
            .broken()
            .map(|l| json!({ "url": l.url, "status": l.status, "parent": l.parent }))
            .collect();
        json!({
            "brokenCount": broken.len(),
            "broken": broken,
        })
    }

    pub fn full_projection(&self) -> Value {
        json!({
            "links": self.links,
            "brokenCount": self.broken_count(),
        })
    }
}

/// Crawls from a start URL and reports every link it saw.
#[async_trait]
pub trait LinkChecker: Send + Sync {
    async fn check(&self, url: &str, settings: &LinkCheckSettings) -> Result<Vec<LinkEntry>>;
}

#[derive(Debug, Deserialize)]
struct LinkinatorOutput {
    #[serde(default)]
    links: Vec<LinkEntry>,
}

/// [`LinkChecker`] backed by the `linkinator` CLI.
#[derive(Debug, Clone)]
pub struct LinkinatorCli {
    program: String,
    timeout_secs: u64,
}

impl LinkinatorCli {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    pub fn args(url: &str, settings: &LinkCheckSettings) -> Vec<String> {
        let mut args = vec![url.to_string()];
        if settings.recurse {
            args.push("--recurse".to_string());
        }
        args.extend([
            "--format".to_string(),
            "json".to_string(),
            "--verbosity".to_string(),
            "info".to_string(),
            "--timeout".to_string(),
            settings.timeout_ms.to_string(),
            "--concurrency".to_string(),
            settings.concurrency.to_string(),
        ]);
        for pattern in &settings.skip {
            args.push("--skip".to_string());
            args.push(pattern.clone());
        }
        args
    }

    /// Parse linkinator's JSON report.
    pub fn parse_output(stdout: &str) -> std::result::Result<Vec<LinkEntry>, serde_json::Error> {
        serde_json::from_str::<LinkinatorOutput>(stdout).map(|o| o.links)
    }
}

#[async_trait]
impl LinkChecker for LinkinatorCli {
    async fn check(&self, url: &str, settings: &LinkCheckSettings) -> Result<Vec<LinkEntry>> {
        let spec = CommandSpec::new(&self.program, Self::args(url, settings));
        let output = capture("linkinator", &spec, self.timeout_secs).await?;

        // A non-zero exit only means broken links were found, as long as the
        // report itself came through.
        match Self::parse_output(&output.stdout) {
            Ok(links) => Ok(links),
            Err(_) if !output.success() => Err(AuditError::ToolFailed {
                tool: "linkinator".to_string(),
                message: output.failure_message(),
            }),
            Err(source) => Err(AuditError::ToolOutput {
                tool: "linkinator".to_string(),
                source,
            }),
        }
    }
}

/// Runs the checker once against the base URL.
pub struct LinkAudit {
    checker: Arc<dyn LinkChecker>,
    settings: LinkCheckSettings,
    internal_only: bool,
}

impl LinkAudit {
    pub fn new(checker: Arc<dyn LinkChecker>, settings: LinkCheckSettings, internal_only: bool) -> Self {
        Self {
            checker,
            settings,
            internal_only,
        }
    }
}

#[async_trait]
impl AuditRunner for LinkAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Links
    }

    async fn run(&self, scope: &AuditScope<'_>) -> Result<AuditResult> {
        let links = self.checker.check(scope.base_url, &self.settings).await?;
        let checked = links.len();
        let report = LinkReport::new(scope.base_url, links, self.internal_only);
        if self.internal_only {
            debug!(checked, kept = report.links.len(), "Filtered links to base origin");
        }
        info!(links = report.links.len(), broken = report.broken_count(), "Link check finished");
        Ok(AuditResult::Links(report))
    }
}
