//! Threshold evaluation for the pass/fail verdict.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditRecord, AuditResult};
use crate::config::Thresholds;

/// Direction of a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// Observed must be at least the limit (scores).
    Minimum,
    /// Observed must be at most the limit (counts).
    Maximum,
}

/// One breached threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdViolation {
    pub category: String,
    pub observed: f64,
    pub limit: f64,
    pub rule: Rule,
}

impl fmt::Display for ThresholdViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule {
            Rule::Minimum => write!(f, "{} {} < {}", self.category, self.observed, self.limit),
            Rule::Maximum => write!(f, "{} {} > {}", self.category, self.observed, self.limit),
        }
    }
}

/// Evaluation verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether every available category met its threshold.
    pub passed: bool,

    /// Breached thresholds, in evaluation order.
    pub violations: Vec<ThresholdViolation>,

    /// Categories with a threshold but no observed value.
    pub unavailable: Vec<String>,
}

/// Headline metrics aggregated from one run.
///
/// `None` means the value could not be observed: the audit kind failed or
/// the tool did not report a score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub lighthouse: BTreeMap<String, Option<f64>>,
    pub accessibility_issues: Option<usize>,
    pub broken_links: Option<usize>,
    pub html_errors: Option<usize>,
}

impl Metrics {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        let mut metrics = Self::default();
        for record in records {
            let Ok(result) = &record.outcome else {
                continue;
            };
            match result {
                AuditResult::Performance(run) => metrics.lighthouse = run.categories.clone(),
                AuditResult::Accessibility(report) => {
                    metrics.accessibility_issues = Some(report.total_issues())
                }
                AuditResult::Links(report) => metrics.broken_links = Some(report.broken_count()),
                AuditResult::Html(report) => metrics.html_errors = Some(report.total_errors()),
            }
        }
        metrics
    }

    pub fn lighthouse_score(&self, category: &str) -> Option<f64> {
        self.lighthouse.get(category).copied().flatten()
    }
}

/// Compare metrics against thresholds.
///
/// Every category is checked; nothing short-circuits. Order is Lighthouse
/// categories (sorted), then accessibility, links and html.
pub fn evaluate(metrics: &Metrics, thresholds: &Thresholds) -> Verdict {
    let mut violations = Vec::new();
    let mut unavailable = Vec::new();

    for (category, &minimum) in &thresholds.lighthouse {
        match metrics.lighthouse_score(category) {
            Some(score) if score < minimum => violations.push(ThresholdViolation {
                category: category.clone(),
                observed: score,
                limit: minimum,
                rule: Rule::Minimum,
            }),
            Some(_) => {}
            None => unavailable.push(category.clone()),
        }
    }

    let counts = [
        (
            "accessibility",
            metrics.accessibility_issues,
            thresholds.accessibility.max_issues,
        ),
        ("links", metrics.broken_links, thresholds.links.max_broken),
        ("html", metrics.html_errors, thresholds.html.max_errors),
    ];
    for (category, observed, maximum) in counts {
        match observed {
            Some(count) if count > maximum => violations.push(ThresholdViolation {
                category: category.to_string(),
                observed: count as f64,
                limit: maximum as f64,
                rule: Rule::Maximum,
            }),
            Some(_) => {}
            None => unavailable.push(category.to_string()),
        }
    }

    Verdict {
        passed: violations.is_empty(),
        violations,
        unavailable,
    }
}
