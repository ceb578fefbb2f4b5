//! jekyll-audit - build, serve and audit a static site
//!
//! ## Commands
//!
//! - `audit`: run the full pipeline and exit non-zero on threshold failures
//! - `init`: write a default `jekyll-audit.config.json`
//!
//! Exit status: `0` pass (or soft-fail), `1` threshold violation,
//! `2` configuration, build or serve failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, warn, Level};

use jekyll_audit_core::{
    AuditConfig, AuditPipeline, AuditResult, ExecContext, Overrides, ReportMode,
    RunOptions, RunOutcome, CONFIG_CANDIDATES,
};

#[derive(Parser)]
#[command(name = "jekyll-audit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Audit a static site for performance, accessibility, links and HTML validity", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, serve and audit the site
    Audit(AuditArgs),

    /// Write a default config file into the current directory
    Init {
        /// Directory to write the config into
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct AuditArgs {
    /// Config file (default: first of jekyll-audit.config.{json,yaml,yml})
    #[arg(short, long, env = "JEKYLL_AUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Audit an already running site; skips build and serve
    #[arg(long, env = "JEKYLL_AUDIT_BASE_URL")]
    base_url: Option<String>,

    /// Reports directory
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Report formats (json, md)
    #[arg(long, value_delimiter = ',')]
    report: Option<Vec<String>>,

    /// Lighthouse report detail: summary or full
    #[arg(long)]
    output: Option<ReportMode>,

    /// Keep per-audit details in the full Lighthouse report
    #[arg(long)]
    include_details: bool,

    /// Keep screenshots in the Lighthouse report
    #[arg(long)]
    include_screenshots: bool,

    /// Gzip the full Lighthouse report
    #[arg(long)]
    gzip: bool,

    /// Always exit 0; the summary still records failures
    #[arg(long)]
    soft_fail: bool,

    /// Maximum number of pages for per-page audits
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_pages: Option<u64>,

    /// Comma-separated paths to audit instead of the sitemap
    #[arg(long)]
    paths: Option<String>,

    /// Ignore sitemap.xml
    #[arg(long)]
    no_sitemap: bool,

    /// Accessibility report detail: summary or full
    #[arg(long)]
    a11y_output: Option<ReportMode>,

    /// Write every accessibility issue in full mode
    #[arg(long)]
    a11y_include_details: bool,

    /// Link report detail: summary or full
    #[arg(long)]
    links_output: Option<ReportMode>,

    /// Only report and count links on the site's own origin
    #[arg(long)]
    links_internal_only: bool,

    /// Write every checked link in full mode
    #[arg(long)]
    links_include_details: bool,

    /// Per-request link check timeout in milliseconds
    #[arg(long)]
    links_timeout: Option<u64>,

    /// Concurrent link check requests
    #[arg(long)]
    links_concurrency: Option<usize>,

    /// HTML validation report detail: summary or full
    #[arg(long)]
    html_output: Option<ReportMode>,

    /// Write every validator message in full mode
    #[arg(long)]
    html_include_details: bool,

    /// Do not run the build command
    #[arg(long)]
    skip_build: bool,

    /// Do not start the local server (requires --base-url to take effect)
    #[arg(long)]
    skip_serve: bool,
}

impl AuditArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            out_dir: self.out_dir.clone(),
            formats: self.report.clone(),
            lighthouse_output: self.output,
            include_details: self.include_details,
            include_screenshots: self.include_screenshots,
            gzip: self.gzip,
            soft_fail: self.soft_fail,
            max_pages: self.max_pages.map(|n| n as usize),
            paths: self
                .paths
                .as_deref()
                .map(|p| p.split(',').map(str::to_string).collect()),
            no_sitemap: self.no_sitemap,
            a11y_output: self.a11y_output,
            a11y_include_details: self.a11y_include_details,
            links_output: self.links_output,
            links_internal_only: self.links_internal_only,
            links_include_details: self.links_include_details,
            links_timeout_ms: self.links_timeout,
            links_concurrency: self.links_concurrency,
            html_output: self.html_output,
            html_include_details: self.html_include_details,
            skip_build: self.skip_build,
            skip_serve: self.skip_serve,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    jekyll_audit_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Audit(args) => cmd_audit(&args).await,
        Commands::Init { path } => cmd_init(&path).map(|_| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Run the audit pipeline; returns the process exit code.
async fn cmd_audit(args: &AuditArgs) -> Result<u8> {
    let ctx = ExecContext::from_process().context("Failed to read working directory")?;
    let config =
        AuditConfig::load(&ctx, args.config.as_deref()).context("Failed to load config")?;
    let options = RunOptions::resolve(config, args.overrides());
    let soft_fail = options.soft_fail;

    let pipeline =
        AuditPipeline::standard(options, ctx).context("Failed to set up audit tools")?;
    let outcome = pipeline.run().await.context("Audit run aborted")?;

    print_outcome(&outcome);

    if !outcome.verdict.passed {
        if soft_fail {
            warn!("Thresholds failed, exiting 0 because of --soft-fail");
        } else {
            error!("One or more thresholds failed.");
        }
    }
    Ok(outcome.exit_code(soft_fail) as u8)
}

fn print_outcome(outcome: &RunOutcome) {
    println!("Audited {}", outcome.base_url);

    for (category, cat) in &outcome.summary.lighthouse {
        match cat.score {
            Some(score) => println!("  Lighthouse {}: {:.2}", category, score),
            None => println!("  Lighthouse {}: n/a", category),
        }
    }

    for record in &outcome.records {
        match &record.outcome {
            Ok(AuditResult::Performance(_)) => {}
            Ok(AuditResult::Accessibility(report)) => println!(
                "  Accessibility: scanned {} page(s), total issues: {}",
                report.pages.len(),
                report.total_issues()
            ),
            Ok(AuditResult::Links(report)) => {
                println!("  Links: broken={}", report.broken_count())
            }
            Ok(AuditResult::Html(report)) => println!(
                "  HTML: scanned {} page(s), total errors: {}",
                report.pages.len(),
                report.total_errors()
            ),
            Err(message) => println!("  {}: failed ({})", record.kind, message),
        }
    }

    if let Some(summary) = outcome.report_paths.last() {
        if let Some(dir) = summary.parent() {
            println!("Reports written to {}", dir.display());
        }
    }
    println!(
        "Result: {}",
        if outcome.verdict.passed { "passed" } else { "failed" }
    );
}

/// Write the default config file, refusing to overwrite an existing one.
fn cmd_init(dir: &Path) -> Result<()> {
    let path = dir.join(CONFIG_CANDIDATES[0]);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let content = serde_json::to_string_pretty(&AuditConfig::default())
        .context("serialize default config")?;
    std::fs::write(&path, content + "\n").with_context(|| format!("write {:?}", path))?;

    println!("Wrote {}", path.display());
    Ok(())
}
