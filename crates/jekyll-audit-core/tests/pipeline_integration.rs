//! Integration tests for the audit pipeline with in-memory collaborators.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jekyll_audit_core::audit::{Collaborators, LighthouseRun, PerformanceScorer, ScoreRequest};
use jekyll_audit_core::fakes::{
    FakeAccessibilityChecker, FakeHtmlValidator, FakeLinkChecker, FakeScorer,
    RecordingCommandRunner,
};
use jekyll_audit_core::{
    AuditError, AuditKind, AuditPipeline, AuditSuite, ExecContext, RunOptions, TargetSource,
};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Site checkout with a pre-built `_site` directory.
fn site() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let build = dir.path().join("_site");
    std::fs::create_dir_all(build.join("about")).expect("mkdir");
    std::fs::write(build.join("index.html"), "<!doctype html><title>home</title>").expect("write");
    std::fs::write(build.join("about/index.html"), "<!doctype html><title>about</title>")
        .expect("write");
    dir
}

fn write_sitemap(dir: &Path, locs: &[&str]) {
    let body: String = locs
        .iter()
        .map(|l| format!("<url><loc>{}</loc></url>", l))
        .collect();
    std::fs::write(
        dir.join("_site/sitemap.xml"),
        format!("<urlset>{}</urlset>", body),
    )
    .expect("write sitemap");
}

fn options(dir: &TempDir) -> RunOptions {
    let mut options = RunOptions::default();
    options.reports.out_dir = dir.path().join("reports");
    options.thresholds.lighthouse = BTreeMap::from([("performance".to_string(), 0.8)]);
    options
}

/// Scorer that fetches the page it is asked to score.
#[derive(Default)]
struct FetchingScorer {
    statuses: Mutex<Vec<u16>>,
}

#[async_trait]
impl PerformanceScorer for FetchingScorer {
    async fn score(
        &self,
        url: &str,
        _request: &ScoreRequest,
    ) -> jekyll_audit_core::Result<LighthouseRun> {
        let status = reqwest::get(url).await?.status().as_u16();
        self.statuses.lock().unwrap().push(status);
        Ok(LighthouseRun::from_report(
            json!({ "categories": { "performance": { "score": 1.0 } } }),
        ))
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json")
}

/// Test: perf 0.75 vs 0.8 and 3 a11y issues vs 0 fail the run; links pass.
#[tokio::test]
async fn test_threshold_violations_fail_the_run() {
    let dir = site();
    let mut opts = options(&dir);
    opts.crawl.explicit_paths = Some(vec!["/".to_string()]);

    let runner = Arc::new(RecordingCommandRunner::succeeding());
    let tools = Collaborators {
        scorer: Arc::new(FakeScorer::with_scores(&[("performance", Some(0.75))])),
        accessibility: Arc::new(FakeAccessibilityChecker::with_issues(3)),
        links: Arc::new(FakeLinkChecker::default()),
        html: Arc::new(FakeHtmlValidator::default()),
    };
    let suite = AuditSuite::from_collaborators(&opts, tools);

    let outcome = AuditPipeline::new(opts, ExecContext::new(dir.path()), runner.clone(), suite)
        .run()
        .await
        .expect("pipeline failed");

    // Build ran once, then the local server was used
    assert_eq!(runner.calls().len(), 1);
    assert!(outcome.base_url.starts_with("http://127.0.0.1:"));

    assert!(!outcome.verdict.passed);
    let categories: Vec<&str> = outcome
        .verdict
        .violations
        .iter()
        .map(|v| v.category.as_str())
        .collect();
    assert_eq!(categories, vec!["performance", "accessibility"]);
    assert_eq!(outcome.exit_code(false), 1);
    assert_eq!(outcome.exit_code(true), 0, "soft-fail always exits 0");

    let summary = read_json(&dir.path().join("reports/summary.json"));
    assert_eq!(summary["passed"], Value::Bool(false));
    assert_eq!(summary["accessibility"]["totalIssues"], 3);
    assert_eq!(summary["links"]["broken"], 0);
    assert_eq!(summary["lighthouse"]["performance"]["score"], 0.75);

    for name in ["lighthouse.json", "pa11y.json", "links.json", "html.json"] {
        assert!(dir.path().join("reports").join(name).is_file(), "{} missing", name);
    }
}

/// Test: one failing target does not stop the remaining targets or later kinds.
#[tokio::test]
async fn test_target_failure_is_isolated() {
    let dir = site();
    write_sitemap(
        dir.path(),
        &[
            "http://site.test/",
            "http://site.test/broken/",
            "http://site.test/about/",
            "http://site.test/",
        ],
    );
    let mut opts = options(&dir);
    opts.base_url = Some("http://site.test".to_string());

    let a11y = Arc::new(FakeAccessibilityChecker::default().failing_on("http://site.test/broken/"));
    let html = Arc::new(FakeHtmlValidator::default());
    let tools = Collaborators {
        scorer: Arc::new(FakeScorer::with_scores(&[("performance", Some(0.9))])),
        accessibility: a11y.clone(),
        links: Arc::new(FakeLinkChecker::default()),
        html: html.clone(),
    };
    let suite = AuditSuite::from_collaborators(&opts, tools);

    let outcome = AuditPipeline::new(
        opts,
        ExecContext::new(dir.path()),
        Arc::new(RecordingCommandRunner::succeeding()),
        suite,
    )
    .run()
    .await
    .expect("pipeline failed");

    assert_eq!(outcome.targets.source, TargetSource::Sitemap);
    assert_eq!(outcome.targets.urls.len(), 3, "duplicates dropped");
    assert_eq!(a11y.urls(), outcome.targets.urls);
    assert_eq!(html.urls(), outcome.targets.urls);

    // The placeholder counts as one issue and breaches max_issues = 0
    assert_eq!(outcome.summary.accessibility.total_issues, Some(1));
    assert!(!outcome.verdict.passed);
}

/// Test: a kind that fails as a whole is recorded and the run continues.
#[tokio::test]
async fn test_failed_kind_writes_error_artifact() {
    let dir = site();
    let mut opts = options(&dir);
    opts.base_url = Some("http://site.test/".to_string());
    opts.reports.formats.push("md".to_string());

    let html = Arc::new(FakeHtmlValidator::default());
    let tools = Collaborators {
        scorer: Arc::new(FakeScorer::failing("chrome crashed")),
        accessibility: Arc::new(FakeAccessibilityChecker::default()),
        links: Arc::new(FakeLinkChecker::with_broken("http://site.test", 2)),
        html: html.clone(),
    };
    let suite = AuditSuite::from_collaborators(&opts, tools);

    let outcome = AuditPipeline::new(
        opts,
        ExecContext::new(dir.path()),
        Arc::new(RecordingCommandRunner::succeeding()),
        suite,
    )
    .run()
    .await
    .expect("pipeline failed");

    assert_eq!(outcome.failed_kinds(), vec![AuditKind::Performance]);
    assert!(!html.urls().is_empty(), "later kinds still ran");

    let lighthouse = read_json(&dir.path().join("reports/lighthouse.json"));
    assert!(lighthouse["error"]
        .as_str()
        .is_some_and(|e| e.contains("chrome crashed")));

    let links = read_json(&dir.path().join("reports/links.json"));
    assert_eq!(links["brokenCount"], 2);

    assert_eq!(outcome.verdict.unavailable, vec!["performance"]);
    let categories: Vec<&str> = outcome
        .verdict
        .violations
        .iter()
        .map(|v| v.category.as_str())
        .collect();
    assert_eq!(categories, vec!["links"]);
    assert!(dir.path().join("reports/summary.md").is_file());
}

/// Test: build failure means no server, no audits and no summary.
#[tokio::test]
async fn test_build_failure_aborts_before_audits() {
    let dir = site();
    let opts = options(&dir);
    let scorer = Arc::new(FakeScorer::with_scores(&[("performance", Some(1.0))]));
    let links = Arc::new(FakeLinkChecker::default());
    let tools = Collaborators {
        scorer: scorer.clone(),
        accessibility: Arc::new(FakeAccessibilityChecker::default()),
        links: links.clone(),
        html: Arc::new(FakeHtmlValidator::default()),
    };
    let suite = AuditSuite::from_collaborators(&opts, tools);

    let err = AuditPipeline::new(
        opts,
        ExecContext::new(dir.path()),
        Arc::new(RecordingCommandRunner::unspawnable()),
        suite,
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, AuditError::BuildSpawn { .. }));
    assert!(err.is_fatal());
    assert!(scorer.urls().is_empty());
    assert!(links.urls().is_empty());
    assert!(!dir.path().join("reports/summary.json").exists());
}

/// Test: the local server answers during the run and is gone afterwards.
#[tokio::test]
async fn test_server_is_released_after_run() {
    let dir = site();
    let mut opts = options(&dir);
    opts.skip_build = true;
    opts.crawl.explicit_paths = Some(vec!["/about/".to_string()]);

    let scorer = Arc::new(FetchingScorer::default());
    let tools = Collaborators {
        scorer: scorer.clone(),
        accessibility: Arc::new(FakeAccessibilityChecker::default()),
        links: Arc::new(FakeLinkChecker::default()),
        html: Arc::new(FakeHtmlValidator::default()),
    };
    let suite = AuditSuite::from_collaborators(&opts, tools);
    let runner = Arc::new(RecordingCommandRunner::succeeding());

    let outcome = AuditPipeline::new(opts, ExecContext::new(dir.path()), runner.clone(), suite)
        .run()
        .await
        .expect("pipeline failed");

    assert!(runner.calls().is_empty(), "build skipped");
    assert_eq!(*scorer.statuses.lock().unwrap(), vec![200]);
    assert!(outcome.verdict.passed);
    assert_eq!(outcome.exit_code(false), 0);
    assert_eq!(
        outcome.targets.urls,
        vec![format!("{}/about/", outcome.base_url)]
    );

    let after = reqwest::get(format!("{}/", outcome.base_url)).await;
    assert!(after.is_err(), "server should be stopped after the run");
}
