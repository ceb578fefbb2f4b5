//! Audit pipeline orchestration.
//!
//! One [`AuditPipeline`] owns one run: build, serve, resolve targets, run
//! every audit kind in order, evaluate thresholds and write the reports.
//! The local server is released on every exit path.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::audit::{AuditKind, AuditRecord, AuditScope, AuditSuite};
use crate::context::ExecContext;
use crate::error::Result;
use crate::lifecycle::SiteLifecycle;
use crate::obs::{self, RunSpan};
use crate::options::RunOptions;
use crate::process::{CommandRunner, TokioCommandRunner};
use crate::report::{ReportWriter, RunSummary};
use crate::targets::{self, ResolvedTargets};
use crate::threshold::{evaluate, Metrics, Verdict};

/// Pipeline stages, in order. `Failed` is only reachable from
/// `Building` and `Serving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Building,
    Serving,
    ResolvingTargets,
    RunningAudits(AuditKind),
    Aggregating,
    WritingReports,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => f.write_str("init"),
            Stage::Building => f.write_str("building"),
            Stage::Serving => f.write_str("serving"),
            Stage::ResolvingTargets => f.write_str("resolving_targets"),
            Stage::RunningAudits(kind) => write!(f, "running_audits.{}", kind),
            Stage::Aggregating => f.write_str("aggregating"),
            Stage::WritingReports => f.write_str("writing_reports"),
            Stage::Done => f.write_str("done"),
            Stage::Failed => f.write_str("failed"),
        }
    }
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub base_url: String,
    pub targets: ResolvedTargets,
    pub summary: RunSummary,
    pub verdict: Verdict,
    pub records: Vec<AuditRecord>,

    /// Every artifact written, summary last.
    pub report_paths: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl RunOutcome {
    /// `0` on pass or soft-fail, `1` when a threshold was breached.
    pub fn exit_code(&self, soft_fail: bool) -> i32 {
        if self.verdict.passed || soft_fail {
            0
        } else {
            1
        }
    }

    pub fn record(&self, kind: AuditKind) -> Option<&AuditRecord> {
        self.records.iter().find(|r| r.kind == kind)
    }

    /// Kinds that failed as a whole.
    pub fn failed_kinds(&self) -> Vec<AuditKind> {
        self.records
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.kind)
            .collect()
    }
}

/// Audit pipeline orchestrator.
pub struct AuditPipeline {
    options: RunOptions,
    ctx: ExecContext,
    lifecycle: SiteLifecycle,
    suite: AuditSuite,
    stage: Stage,
}

impl AuditPipeline {
    pub fn new(
        options: RunOptions,
        ctx: ExecContext,
        runner: Arc<dyn CommandRunner>,
        suite: AuditSuite,
    ) -> Self {
        Self {
            options,
            ctx,
            lifecycle: SiteLifecycle::new(runner),
            suite,
            stage: Stage::Init,
        }
    }

    /// Pipeline backed by real subprocesses and the real audit tools.
    pub fn standard(options: RunOptions, ctx: ExecContext) -> Result<Self> {
        let suite = AuditSuite::standard(&options)?;
        Ok(Self::new(options, ctx, Arc::new(TokioCommandRunner), suite))
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Execute the run. Build and serve failures are returned as errors;
    /// threshold violations are part of the outcome.
    pub async fn run(mut self) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id);

        async move {
            let result = self.execute(&run_id).await;
            self.lifecycle.release().await;
            result
        }
        .instrument(span.span())
        .await
    }

    fn enter(&mut self, stage: Stage) {
        transition(&mut self.stage, stage);
    }

    async fn execute(&mut self, run_id: &str) -> Result<RunOutcome> {
        let start = Instant::now();
        self.enter(Stage::Init);
        info!(run_id = %run_id, audits = self.suite.len(), "Starting site audit");

        let writer = ReportWriter::new(self.ctx.resolve(&self.options.reports.out_dir));
        writer.prepare()?;

        let base_url = self.acquire().await?;

        self.enter(Stage::ResolvingTargets);
        let resolved = targets::resolve(
            &self.ctx.resolve(&self.options.build_dir),
            &base_url,
            &self.options.crawl,
        );
        info!(
            source = resolved.source.as_str(),
            count = resolved.urls.len(),
            "Resolved audit targets"
        );

        let mut records = Vec::with_capacity(self.suite.len());
        let mut report_paths = Vec::new();
        let scope = AuditScope {
            base_url: &base_url,
            targets: &resolved.urls,
        };
        let kinds: Vec<AuditKind> = self.suite.runners().iter().map(|r| r.kind()).collect();
        for (index, kind) in kinds.into_iter().enumerate() {
            self.enter(Stage::RunningAudits(kind));
            let started = Instant::now();
            let outcome = self.suite.runners()[index]
                .run(&scope)
                .await
                .map_err(|e| {
                    warn!(kind = %kind, error = %e, "Audit failed");
                    e.to_string()
                });
            obs::emit_audit_finished(kind, started.elapsed().as_millis() as u64, outcome.is_ok());

            let record = AuditRecord { kind, outcome };
            match writer.write_audit(&record, &self.options.reports) {
                Ok(path) => report_paths.push(path),
                Err(e) => error!(kind = %kind, error = %e, "Failed to write audit report"),
            }
            records.push(record);
        }

        self.enter(Stage::Aggregating);
        let metrics = Metrics::from_records(&records);
        let verdict = evaluate(&metrics, &self.options.thresholds);
        for violation in &verdict.violations {
            obs::emit_threshold_violated(violation);
        }
        for category in &verdict.unavailable {
            obs::emit_threshold_unavailable(category);
        }

        self.enter(Stage::WritingReports);
        let summary = RunSummary::new(
            &base_url,
            &metrics,
            &self.options.thresholds,
            &verdict,
            Utc::now(),
        );
        report_paths.extend(writer.write_summary(&summary, &self.options.reports)?);

        self.enter(Stage::Done);
        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(run_id, duration_ms, verdict.passed, verdict.violations.len());

        Ok(RunOutcome {
            run_id: run_id.to_string(),
            base_url,
            targets: resolved,
            summary,
            verdict,
            records,
            report_paths,
            duration_ms,
        })
    }

    async fn acquire(&mut self) -> Result<String> {
        let stage = &mut self.stage;
        self.lifecycle
            .acquire_staged(&self.options, &self.ctx, |next| transition(stage, next))
            .await
    }
}

fn transition(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "Stage transition");
    *stage = next;
    obs::emit_stage_entered(&next.to_string());
}
