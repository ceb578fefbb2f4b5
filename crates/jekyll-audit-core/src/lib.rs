//! jekyll-audit - site audit pipeline
//!
//! Builds a static site, serves it locally and audits it for:
//! - Performance / SEO scores (Lighthouse)
//! - Accessibility issues (pa11y)
//! - Broken links (linkinator)
//! - HTML validity (Nu HTML Checker)
//!
//! Results are compared against configured thresholds and written as JSON
//! reports plus a run summary.

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod fakes;
pub mod lifecycle;
pub mod obs;
pub mod options;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod targets;
pub mod telemetry;
pub mod threshold;

// Re-export key types
pub use audit::{AuditKind, AuditRecord, AuditResult, AuditRunner, AuditScope, AuditSuite, Collaborators};
pub use config::{AuditConfig, Thresholds, CONFIG_CANDIDATES};
pub use context::ExecContext;
pub use error::{AuditError, Result};
pub use lifecycle::SiteLifecycle;
pub use options::{Overrides, ReportMode, RunOptions};
pub use pipeline::{AuditPipeline, RunOutcome, Stage};
pub use process::{CommandRunner, CommandSpec, TokioCommandRunner};
pub use report::{ReportWriter, RunSummary};
pub use targets::{ResolvedTargets, TargetSource};
pub use telemetry::init_tracing;
pub use threshold::{evaluate, Metrics, ThresholdViolation, Verdict};
