//! Report artifacts: one file per audit kind plus the run summary.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::audit::{AuditKind, AuditRecord, AuditResult};
use crate::config::Thresholds;
use crate::error::Result;
use crate::obs;
use crate::options::{ReportMode, ReportOptions};
use crate::threshold::{Metrics, Verdict};

pub const SUMMARY_JSON: &str = "summary.json";
pub const SUMMARY_MD: &str = "summary.md";

/// Score and minimum for one Lighthouse category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilitySummary {
    pub total_issues: Option<usize>,
    pub threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinksSummary {
    pub broken: Option<usize>,
    pub threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlSummary {
    pub total_errors: Option<usize>,
    pub threshold: usize,
}

/// Persisted `summary.json`. A `null` metric means the audit kind failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub base_url: String,
    pub lighthouse: BTreeMap<String, CategorySummary>,
    pub accessibility: AccessibilitySummary,
    pub links: LinksSummary,
    pub html: HtmlSummary,
    pub passed: bool,
    pub violations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(
        base_url: &str,
        metrics: &Metrics,
        thresholds: &Thresholds,
        verdict: &Verdict,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut lighthouse: BTreeMap<String, CategorySummary> = metrics
            .lighthouse
            .iter()
            .map(|(id, score)| {
                (
                    id.clone(),
                    CategorySummary {
                        score: *score,
                        threshold: thresholds.lighthouse.get(id).copied(),
                    },
                )
            })
            .collect();
        for (id, minimum) in &thresholds.lighthouse {
            lighthouse
                .entry(id.clone())
                .or_insert_with(|| CategorySummary {
                    score: None,
                    threshold: Some(*minimum),
                });
        }

        Self {
            base_url: base_url.to_string(),
            lighthouse,
            accessibility: AccessibilitySummary {
                total_issues: metrics.accessibility_issues,
                threshold: thresholds.accessibility.max_issues,
            },
            links: LinksSummary {
                broken: metrics.broken_links,
                threshold: thresholds.links.max_broken,
            },
            html: HtmlSummary {
                total_errors: metrics.html_errors,
                threshold: thresholds.html.max_errors,
            },
            passed: verdict.passed,
            violations: verdict.violations.iter().map(|v| v.to_string()).collect(),
            timestamp,
        }
    }
}

fn fmt_count(value: Option<usize>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

/// Render `summary.md`.
pub fn render_summary_md(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("# Site Audit Summary\n\n");
    out.push_str(&format!("- base URL: {}\n", summary.base_url));
    out.push_str(&format!(
        "- result: {}\n",
        if summary.passed { "passed" } else { "failed" }
    ));
    out.push_str(&format!("- generated: {}\n\n", summary.timestamp.to_rfc3339()));

    out.push_str("## Lighthouse\n");
    out.push_str("| category | score | minimum |\n|---|---|---|\n");
    for (id, cat) in &summary.lighthouse {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            id,
            cat.score.map_or_else(|| "n/a".to_string(), |s| format!("{:.2}", s)),
            cat.threshold.map_or_else(|| "-".to_string(), |t| format!("{:.2}", t)),
        ));
    }
    out.push('\n');

    out.push_str("## Checks\n");
    out.push_str(&format!(
        "- accessibility issues: {} (max {})\n- broken links: {} (max {})\n- HTML errors: {} (max {})\n",
        fmt_count(summary.accessibility.total_issues),
        summary.accessibility.threshold,
        fmt_count(summary.links.broken),
        summary.links.threshold,
        fmt_count(summary.html.total_errors),
        summary.html.threshold,
    ));

    if !summary.violations.is_empty() {
        out.push_str("\n## Violations\n");
        for v in &summary.violations {
            out.push_str(&format!("- {}\n", v));
        }
    }
    out
}

/// The JSON written for one audit record under the given verbosity.
pub fn audit_payload(record: &AuditRecord, options: &ReportOptions) -> Value {
    let result = match &record.outcome {
        Ok(result) => result,
        Err(message) => return json!({ "error": message }),
    };
    match result {
        AuditResult::Performance(run) => {
            let lh = &options.lighthouse;
            match lh.verbosity.mode {
                ReportMode::Full => run.full_projection(lh.verbosity.include_details),
                ReportMode::Summary => run.summary_projection(),
            }
        }
        AuditResult::Accessibility(report) => {
            if options.accessibility.wants_full_payload() {
                report.full_projection()
            } else {
                report.summary_projection()
            }
        }
        AuditResult::Links(report) => {
            if options.links.wants_full_payload() {
                report.full_projection()
            } else {
                report.summary_projection()
            }
        }
        AuditResult::Html(report) => {
            if options.html.wants_full_payload() {
                report.full_projection()
            } else {
                report.summary_projection()
            }
        }
    }
}

/// Writes artifacts into the output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Create the output directory if needed.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)?;
        Ok(())
    }

    /// File name used for a kind's artifact.
    pub fn artifact_name(kind: AuditKind, options: &ReportOptions) -> String {
        if kind == AuditKind::Performance && options.lighthouse.gzip_enabled() {
            format!("{}.json.gz", kind.artifact_stem())
        } else {
            format!("{}.json", kind.artifact_stem())
        }
    }

    /// Write one audit kind's artifact.
    pub fn write_audit(&self, record: &AuditRecord, options: &ReportOptions) -> Result<PathBuf> {
        let payload = audit_payload(record, options);
        let path = self
            .out_dir
            .join(Self::artifact_name(record.kind, options));
        let content = serde_json::to_vec_pretty(&payload)?;

        if path.extension().is_some_and(|ext| ext == "gz") {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&content)?;
            std::fs::write(&path, encoder.finish()?)?;
        } else {
            std::fs::write(&path, content)?;
        }
        obs::emit_report_written(&path);
        Ok(path)
    }

    /// Write `summary.json`, plus `summary.md` when requested.
    pub fn write_summary(&self, summary: &RunSummary, options: &ReportOptions) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        let json_path = self.out_dir.join(SUMMARY_JSON);
        std::fs::write(&json_path, serde_json::to_string_pretty(summary)?)?;
        obs::emit_report_written(&json_path);
        written.push(json_path);

        if options.wants_markdown() {
            let md_path = self.out_dir.join(SUMMARY_MD);
            std::fs::write(&md_path, render_summary_md(summary))?;
            obs::emit_report_written(&md_path);
            written.push(md_path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{A11yPage, AccessibilityReport, LighthouseRun};
    use crate::options::{RunOptions, Verbosity};
    use crate::threshold::{evaluate, Metrics};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc)
    }

    fn metrics() -> Metrics {
        Metrics {
            lighthouse: BTreeMap::from([
                ("performance".to_string(), Some(0.75)),
                ("pwa".to_string(), Some(0.3)),
            ]),
            accessibility_issues: Some(3),
            broken_links: Some(0),
            html_errors: None,
        }
    }

    fn lighthouse_record() -> AuditRecord {
        AuditRecord {
            kind: AuditKind::Performance,
            outcome: Ok(AuditResult::Performance(LighthouseRun::from_report(json!({
                "lighthouseVersion": "12",
                "categories": { "performance": { "score": 0.9 } },
                "audits": { "speed-index": { "score": 1, "details": { "x": 1 } } },
                "timing": { "total": 1 }
            })))),
        }
    }

    #[test]
    fn summary_schema_has_expected_keys() {
        let thresholds = Thresholds::default();
        let verdict = evaluate(&metrics(), &thresholds);
        let summary = RunSummary::new("http://s/", &metrics(), &thresholds, &verdict, fixed_time());

        let raw = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(raw["baseUrl"], json!("http://s/"));
        assert_eq!(raw["lighthouse"]["performance"]["score"], json!(0.75));
        assert_eq!(raw["lighthouse"]["performance"]["threshold"], json!(0.8));
        assert!(raw["lighthouse"]["pwa"].get("threshold").is_none());
        assert_eq!(raw["lighthouse"]["seo"]["score"], Value::Null);
        assert_eq!(raw["accessibility"]["totalIssues"], json!(3));
        assert_eq!(raw["links"]["broken"], json!(0));
        assert_eq!(raw["html"]["totalErrors"], Value::Null);
        assert_eq!(raw["passed"], json!(false));
        assert_eq!(raw["timestamp"], json!("2026-01-01T00:00:00Z"));
        assert_eq!(raw["violations"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn summary_markdown_render_is_stable() {
        let thresholds = Thresholds::default();
        let m = Metrics {
            lighthouse: BTreeMap::from([("performance".to_string(), Some(0.75))]),
            accessibility_issues: Some(0),
            broken_links: Some(0),
            html_errors: Some(0),
        };
        let mut t = thresholds.clone();
        t.lighthouse = BTreeMap::from([("performance".to_string(), 0.8)]);
        let verdict = evaluate(&m, &t);
        let summary = RunSummary::new("http://s/", &m, &t, &verdict, fixed_time());

        let expected = "# Site Audit Summary\n\n- base URL: http://s/\n- result: failed\n- generated: 2026-01-01T00:00:00+00:00\n\n## Lighthouse\n| category | score | minimum |\n|---|---|---|\n| performance | 0.75 | 0.80 |\n\n## Checks\n- accessibility issues: 0 (max 0)\n- broken links: 0 (max 0)\n- HTML errors: 0 (max 0)\n\n## Violations\n- performance 0.75 < 0.8\n";
        assert_eq!(render_summary_md(&summary), expected);
    }

    #[test]
    fn failed_kind_writes_error_payload() {
        let record = AuditRecord {
            kind: AuditKind::Links,
            outcome: Err("linkinator: not found".to_string()),
        };
        let payload = audit_payload(&record, &RunOptions::default().reports);
        assert_eq!(payload, json!({ "error": "linkinator: not found" }));
    }

    #[test]
    fn per_page_full_payload_needs_details() {
        let record = AuditRecord {
            kind: AuditKind::Accessibility,
            outcome: Ok(AuditResult::Accessibility(AccessibilityReport {
                pages: vec![A11yPage::failed("http://s/", "boom")],
            })),
        };
        let mut options = RunOptions::default().reports;
        options.accessibility = Verbosity {
            mode: ReportMode::Full,
            include_details: false,
        };
        assert!(audit_payload(&record, &options).get("perPage").is_some());

        options.accessibility.include_details = true;
        assert!(audit_payload(&record, &options).is_array());
    }

    #[test]
    fn lighthouse_full_without_details_is_trimmed() {
        let mut options = RunOptions::default().reports;
        options.lighthouse.verbosity.mode = ReportMode::Full;
        let payload = audit_payload(&lighthouse_record(), &options);
        assert!(payload["audits"]["speed-index"].get("details").is_none());
        assert!(payload.get("timing").is_none());
    }

    #[test]
    fn gzip_artifact_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let writer = ReportWriter::new(dir.path().join("reports"));
        writer.prepare().expect("prepare");

        let mut options = RunOptions::default().reports;
        options.lighthouse.verbosity.mode = ReportMode::Full;
        options.lighthouse.gzip = true;

        let path = writer
            .write_audit(&lighthouse_record(), &options)
            .expect("write");
        assert!(path.ends_with("lighthouse.json.gz"));

        let mut decoded = String::new();
        GzDecoder::new(std::fs::File::open(&path).expect("open"))
            .read_to_string(&mut decoded)
            .expect("gunzip");
        let value: Value = serde_json::from_str(&decoded).expect("json");
        assert_eq!(value["lighthouseVersion"], json!("12"));
    }

    #[test]
    fn gzip_ignored_in_summary_mode() {
        let mut options = RunOptions::default().reports;
        options.lighthouse.gzip = true;
        assert_eq!(
            ReportWriter::artifact_name(AuditKind::Performance, &options),
            "lighthouse.json"
        );
    }

    #[test]
    fn markdown_summary_only_when_requested() {
        let dir = TempDir::new().expect("tempdir");
        let writer = ReportWriter::new(dir.path());
        let thresholds = Thresholds::default();
        let verdict = evaluate(&metrics(), &thresholds);
        let summary = RunSummary::new("http://s/", &metrics(), &thresholds, &verdict, fixed_time());

        let mut options = RunOptions::default().reports;
        let written = writer.write_summary(&summary, &options).expect("write");
        assert_eq!(written.len(), 1);
        assert!(!dir.path().join(SUMMARY_MD).exists());

        options.formats.push("md".to_string());
        let written = writer.write_summary(&summary, &options).expect("write");
        assert_eq!(written.len(), 2);

        let parsed: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(SUMMARY_JSON)).expect("read"))
                .expect("parse");
        assert!(!parsed.passed);
    }
}
