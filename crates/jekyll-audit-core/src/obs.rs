//! Structured observability hooks for audit run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`RunSpan`], tagged with the run id
//! - Emission functions for key lifecycle events: stage transitions, audit
//!   completion, threshold outcomes, written artifacts and run completion
//!
//! Events are emitted at `info!` level (`warn!` for violations), filtered by
//! `RUST_LOG`. Use `--json` on the CLI for newline-delimited JSON.

use std::path::Path;

use tracing::{info, warn, Span};

use crate::audit::AuditKind;
use crate::threshold::ThresholdViolation;

/// Span that tags every log line of one run with its `run_id`.
///
/// Attach it to the run future with `tracing::Instrument`; use
/// [`RunSpan::enter`] only around synchronous sections.
#[derive(Debug, Clone)]
pub struct RunSpan {
    span: Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("jekyll_audit.run", run_id = %run_id),
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Emit event: pipeline entered a stage.
pub fn emit_stage_entered(stage: &str) {
    info!(event = "stage.entered", stage = %stage);
}

/// Emit event: one audit kind finished, successfully or not.
pub fn emit_audit_finished(kind: AuditKind, duration_ms: u64, success: bool) {
    info!(
        event = "audit.finished",
        kind = %kind,
        tool = kind.tool(),
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a threshold was breached.
pub fn emit_threshold_violated(violation: &ThresholdViolation) {
    warn!(
        event = "threshold.violated",
        category = %violation.category,
        observed = violation.observed,
        limit = violation.limit,
        "Threshold warning: {}",
        violation
    );
}

/// Emit event: a category had a threshold but nothing was observed.
pub fn emit_threshold_unavailable(category: &str) {
    warn!(event = "threshold.unavailable", category = %category, "No value observed; not evaluated");
}

/// Emit event: an artifact was written.
pub fn emit_report_written(path: &Path) {
    info!(event = "report.written", path = %path.display());
}

/// Emit event: run finished with duration and verdict.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, passed: bool, violations: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        passed = passed,
        violations = violations,
    );
}
