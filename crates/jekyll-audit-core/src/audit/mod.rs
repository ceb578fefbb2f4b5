//! Audit runners.
//!
//! Every audit kind implements [`AuditRunner`]: given the base URL and the
//! resolved targets it returns one [`AuditResult`] variant. Each runner
//! wraps a narrow collaborator trait (the actual tool) so the orchestrator
//! never deals with tool specifics.
//!
//! Per-page runners (accessibility, html) turn a failing target into an
//! error placeholder and keep going. Site-wide runners (performance, links)
//! return `Err` and the whole kind is recorded as failed.

pub mod accessibility;
pub mod html;
pub mod links;
pub mod performance;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::options::RunOptions;

pub use accessibility::{
    A11yIssue, A11yPage, A11ySettings, AccessibilityAudit, AccessibilityChecker,
    AccessibilityReport, Pa11yCli,
};
pub use html::{HtmlAudit, HtmlMessage, HtmlPage, HtmlReport, HtmlValidator, NuHtmlValidator};
pub use links::{LinkAudit, LinkCheckSettings, LinkChecker, LinkEntry, LinkReport, LinkState, LinkinatorCli};
pub use performance::{LighthouseCli, LighthouseRun, PerformanceAudit, PerformanceScorer, ScoreRequest};

/// The closed set of audit kinds, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Performance,
    Accessibility,
    Links,
    Html,
}

impl AuditKind {
    /// All kinds in the order the pipeline runs them.
    pub const ALL: [AuditKind; 4] = [
        AuditKind::Performance,
        AuditKind::Accessibility,
        AuditKind::Links,
        AuditKind::Html,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AuditKind::Performance => "performance",
            AuditKind::Accessibility => "accessibility",
            AuditKind::Links => "links",
            AuditKind::Html => "html",
        }
    }

    /// Underlying tool, for logs.
    pub fn tool(&self) -> &'static str {
        match self {
            AuditKind::Performance => "lighthouse",
            AuditKind::Accessibility => "pa11y",
            AuditKind::Links => "linkinator",
            AuditKind::Html => "html-validator",
        }
    }

    /// Artifact file name stem in the reports directory.
    pub fn artifact_stem(&self) -> &'static str {
        match self {
            AuditKind::Performance => "lighthouse",
            AuditKind::Accessibility => "pa11y",
            AuditKind::Links => "links",
            AuditKind::Html => "html",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a runner gets to work on.
#[derive(Debug, Clone, Copy)]
pub struct AuditScope<'a> {
    /// Root URL of the site under audit.
    pub base_url: &'a str,

    /// Deduplicated, capped per-page targets.
    pub targets: &'a [String],
}

/// Result of one audit kind.
#[derive(Debug, Clone)]
pub enum AuditResult {
    Performance(LighthouseRun),
    Accessibility(AccessibilityReport),
    Links(LinkReport),
    Html(HtmlReport),
}

impl AuditResult {
    pub fn kind(&self) -> AuditKind {
        match self {
            AuditResult::Performance(_) => AuditKind::Performance,
            AuditResult::Accessibility(_) => AuditKind::Accessibility,
            AuditResult::Links(_) => AuditKind::Links,
            AuditResult::Html(_) => AuditKind::Html,
        }
    }
}

/// One audit kind's outcome as kept by the orchestrator.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub kind: AuditKind,

    /// The result, or the run-level error message for this kind.
    pub outcome: std::result::Result<AuditResult, String>,
}

impl AuditRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Polymorphic audit capability.
#[async_trait]
pub trait AuditRunner: Send + Sync {
    /// Which kind this runner produces.
    fn kind(&self) -> AuditKind;

    /// Audit the scope.
    ///
    /// Per-page runners never fail as a whole; site-wide runners return the
    /// collaborator's error.
    async fn run(&self, scope: &AuditScope<'_>) -> Result<AuditResult>;
}

/// The tools backing each audit kind.
#[derive(Clone)]
pub struct Collaborators {
    pub scorer: Arc<dyn PerformanceScorer>,
    pub accessibility: Arc<dyn AccessibilityChecker>,
    pub links: Arc<dyn LinkChecker>,
    pub html: Arc<dyn HtmlValidator>,
}

impl Collaborators {
    /// CLI and HTTP adapters configured from the run options.
    pub fn standard(options: &RunOptions) -> Result<Self> {
        let tools = &options.tools;
        Ok(Self {
            scorer: Arc::new(LighthouseCli::new(&tools.lighthouse, tools.timeout_secs)),
            accessibility: Arc::new(Pa11yCli::new(&tools.pa11y, tools.timeout_secs)),
            links: Arc::new(LinkinatorCli::new(&tools.linkinator, tools.timeout_secs)),
            html: Arc::new(NuHtmlValidator::new(&tools.validator_url)?),
        })
    }
}

/// Ordered set of runners driven by the orchestrator.
pub struct AuditSuite {
    runners: Vec<Box<dyn AuditRunner>>,
}

impl AuditSuite {
    /// Build a suite; runners are ordered by [`AuditKind`].
    pub fn new(mut runners: Vec<Box<dyn AuditRunner>>) -> Self {
        runners.sort_by_key(|r| r.kind());
        Self { runners }
    }

    /// The four standard runners over the given collaborators.
    pub fn from_collaborators(options: &RunOptions, tools: Collaborators) -> Self {
        Self::new(vec![
            Box::new(PerformanceAudit::new(tools.scorer, ScoreRequest::from_options(options))),
            Box::new(AccessibilityAudit::new(
                tools.accessibility,
                A11ySettings::from_options(options),
            )),
            Box::new(LinkAudit::new(
                tools.links,
                LinkCheckSettings::from_options(options),
                options.links.internal_only,
            )),
            Box::new(HtmlAudit::new(tools.html)),
        ])
    }

    /// The four standard runners backed by the real tools.
    pub fn standard(options: &RunOptions) -> Result<Self> {
        Ok(Self::from_collaborators(options, Collaborators::standard(options)?))
    }

    pub fn runners(&self) -> &[Box<dyn AuditRunner>] {
        &self.runners
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}
