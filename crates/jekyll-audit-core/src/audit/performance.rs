//! Performance / SEO scoring via Lighthouse.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use super::{AuditKind, AuditResult, AuditRunner, AuditScope};
use crate::error::{AuditError, Result};
use crate::options::{ReportMode, RunOptions};
use crate::process::{capture, CommandSpec};

/// Audits that only carry screenshots.
pub const SCREENSHOT_AUDITS: &[&str] = &[
    "screenshot-thumbnails",
    "final-screenshot",
    "full-page-screenshot",
];

/// Large diagnostic audits skipped in summary mode.
pub const HEAVY_AUDITS: &[&str] = &[
    "network-requests",
    "tasks",
    "diagnostics",
    "resource-summary",
    "script-treemap-data",
    "third-party-summary",
    "duplicate-javascript",
];

/// Metric audits kept in the summary projection.
pub const SUMMARY_METRICS: &[&str] = &[
    "first-contentful-paint",
    "largest-contentful-paint",
    "speed-index",
    "total-blocking-time",
    "cumulative-layout-shift",
    "interactive",
];

/// What to ask the scorer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRequest {
    /// Categories to score; empty means the tool's default set.
    pub categories: Vec<String>,
    pub include_screenshots: bool,
    pub skip_heavy_audits: bool,
}

impl ScoreRequest {
    pub fn from_options(options: &RunOptions) -> Self {
        let lighthouse = &options.reports.lighthouse;
        Self {
            categories: options.lighthouse_categories(),
            include_screenshots: lighthouse.include_screenshots,
            skip_heavy_audits: lighthouse.verbosity.mode == ReportMode::Summary,
        }
    }

    /// Audit ids the scorer should not run.
    pub fn skip_audits(&self) -> Vec<&'static str> {
        let mut skip = Vec::new();
        if !self.include_screenshots {
            skip.extend_from_slice(SCREENSHOT_AUDITS);
        }
        if self.skip_heavy_audits {
            skip.extend_from_slice(HEAVY_AUDITS);
        }
        skip
    }
}

/// One Lighthouse run against the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct LighthouseRun {
    /// Category id to score; `None` when the tool produced no score.
    pub categories: BTreeMap<String, Option<f64>>,

    /// The complete report as produced by the tool.
    pub report: Value,
}

impl LighthouseRun {
    /// Build a run from a raw Lighthouse JSON report.
    pub fn from_report(report: Value) -> Self {
        Self {
            categories: categories_from_report(&report),
            report,
        }
    }

    /// Score for one category, if present.
    pub fn score(&self, category: &str) -> Option<f64> {
        self.categories.get(category).copied().flatten()
    }

    /// Headline projection: identity fields, category scores and core metrics.
    pub fn summary_projection(&self) -> Value {
        let report = &self.report;
        let mut metrics = Map::new();
        if let Some(audits) = report.get("audits").and_then(Value::as_object) {
            for id in SUMMARY_METRICS {
                if let Some(audit) = audits.get(*id) {
                    let mut entry = Map::new();
                    entry.insert("score".into(), audit.get("score").cloned().unwrap_or(Value::Null));
                    entry.insert(
                        "numericValue".into(),
                        audit.get("numericValue").cloned().unwrap_or(Value::Null),
                    );
                    if let Some(display) = audit.get("displayValue") {
                        entry.insert("displayValue".into(), display.clone());
                    }
                    metrics.insert((*id).to_string(), Value::Object(entry));
                }
            }
        }

        let categories: Map<String, Value> = self
            .categories
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "score": v })))
            .collect();

        json!({
            "userAgent": report.get("userAgent"),
            "fetchTime": report.get("fetchTime"),
            "requestedUrl": report.get("requestedUrl"),
            "finalUrl": report.get("finalUrl"),
            "lighthouseVersion": report.get("lighthouseVersion"),
            "categories": categories,
            "metrics": metrics,
        })
    }

    /// Full projection. Without details, per-audit `details` and the heavy
    /// top-level `i18n`, `timing` and `stackPacks` sections are dropped.
    pub fn full_projection(&self, include_details: bool) -> Value {
        let mut report = self.report.clone();
        if !include_details {
            if let Some(audits) = report.get_mut("audits").and_then(Value::as_object_mut) {
                for audit in audits.values_mut() {
                    if let Some(obj) = audit.as_object_mut() {
                        obj.remove("details");
                    }
                }
            }
            if let Some(obj) = report.as_object_mut() {
                obj.remove("i18n");
                obj.remove("timing");
                obj.remove("stackPacks");
            }
        }
        report
    }
}

/// Read `categories.<id>.score` from a Lighthouse report.
pub fn categories_from_report(report: &Value) -> BTreeMap<String, Option<f64>> {
    report
        .get("categories")
        .and_then(Value::as_object)
        .map(|cats| {
            cats.iter()
                .map(|(id, cat)| (id.clone(), cat.get("score").and_then(Value::as_f64)))
                .collect()
        })
        .unwrap_or_default()
}

/// Remove screenshot audits, the full-page screenshot and every inline
/// `data:image/` payload under audit details.
pub fn strip_screenshots(report: &mut Value) {
    let Some(root) = report.as_object_mut() else {
        return;
    };
    root.remove("fullPageScreenshot");
    let Some(audits) = root.get_mut("audits").and_then(Value::as_object_mut) else {
        return;
    };
    for id in SCREENSHOT_AUDITS {
        audits.remove(*id);
    }
    for audit in audits.values_mut() {
        if let Some(details) = audit.get_mut("details") {
            scrub_inline_images(details);
        }
    }
}

fn scrub_inline_images(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, v| !is_inline_image(v));
            fields.values_mut().for_each(scrub_inline_images);
        }
        Value::Array(items) => {
            items.retain(|v| !is_inline_image(v));
            items.iter_mut().for_each(scrub_inline_images);
        }
        _ => {}
    }
}

fn is_inline_image(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| s.starts_with("data:image/"))
        .unwrap_or(false)
}

/// Scores one URL.
#[async_trait]
pub trait PerformanceScorer: Send + Sync {
    async fn score(&self, url: &str, request: &ScoreRequest) -> Result<LighthouseRun>;
}

/// [`PerformanceScorer`] that shells out to the `lighthouse` CLI.
#[derive(Debug, Clone)]
pub struct LighthouseCli {
    program: String,
    timeout_secs: u64,
}

impl LighthouseCli {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    /// Arguments for one headless run writing JSON to stdout.
    pub fn args(url: &str, request: &ScoreRequest) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
            "--chrome-flags=--headless --no-sandbox --disable-gpu".to_string(),
        ];
        if !request.categories.is_empty() {
            args.push(format!("--only-categories={}", request.categories.join(",")));
        }
        let skip = request.skip_audits();
        if !skip.is_empty() {
            args.push(format!("--skip-audits={}", skip.join(",")));
        }
        args
    }
}

#[async_trait]
impl PerformanceScorer for LighthouseCli {
    async fn score(&self, url: &str, request: &ScoreRequest) -> Result<LighthouseRun> {
        let spec = CommandSpec::new(&self.program, Self::args(url, request));
        let output = capture("lighthouse", &spec, self.timeout_secs).await?;
        if !output.success() {
            return Err(AuditError::ToolFailed {
                tool: "lighthouse".to_string(),
                message: output.failure_message(),
            });
        }
        let report: Value =
            serde_json::from_str(&output.stdout).map_err(|source| AuditError::ToolOutput {
                tool: "lighthouse".to_string(),
                source,
            })?;
        Ok(LighthouseRun::from_report(report))
    }
}

/// Runs the scorer once against the base URL.
pub struct PerformanceAudit {
    scorer: Arc<dyn PerformanceScorer>,
    request: ScoreRequest,
}

impl PerformanceAudit {
    pub fn new(scorer: Arc<dyn PerformanceScorer>, request: ScoreRequest) -> Self {
        Self { scorer, request }
    }
}

#[async_trait]
impl AuditRunner for PerformanceAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Performance
    }

    async fn run(&self, scope: &AuditScope<'_>) -> Result<AuditResult> {
        let mut run = self.scorer.score(scope.base_url, &self.request).await?;
        if !self.request.include_screenshots {
            strip_screenshots(&mut run.report);
        }
        for (category, score) in &run.categories {
            match score {
                Some(s) => info!(category = %category, score = s, "Lighthouse score"),
                None => info!(category = %category, "Lighthouse score unavailable"),
            }
        }
        Ok(AuditResult::Performance(run))
    }
}
