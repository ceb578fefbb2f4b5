//! Resolved run options.
//!
//! [`RunOptions`] is the config file merged with command-line overrides.
//! It is built once and borrowed read-only by every stage.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{AccessibilityConfig, AuditConfig, LinksConfig, Thresholds, ToolsConfig};

/// Report detail level for one audit kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Headline counts and scores only.
    #[default]
    Summary,
    /// Complete diagnostic payload.
    Full,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Summary => "summary",
            ReportMode::Full => "full",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(ReportMode::Summary),
            "full" => Ok(ReportMode::Full),
            other => Err(format!("unknown report mode '{}' (expected summary|full)", other)),
        }
    }
}

/// Verbosity of one audit's artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    pub mode: ReportMode,
    pub include_details: bool,
}

impl Verbosity {
    /// Whether the per-page audits should write their full payload.
    ///
    /// Both the full mode and the details flag are required.
    pub fn wants_full_payload(&self) -> bool {
        self.mode == ReportMode::Full && self.include_details
    }
}

/// Lighthouse artifact settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LighthouseReportOptions {
    pub verbosity: Verbosity,
    pub include_screenshots: bool,
    /// Only honoured in full mode.
    pub gzip: bool,
}

impl LighthouseReportOptions {
    pub fn gzip_enabled(&self) -> bool {
        self.gzip && self.verbosity.mode == ReportMode::Full
    }
}

/// Artifact settings for every audit kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub out_dir: PathBuf,
    pub formats: Vec<String>,
    pub lighthouse: LighthouseReportOptions,
    pub accessibility: Verbosity,
    pub links: Verbosity,
    pub html: Verbosity,
}

impl ReportOptions {
    /// Whether a markdown summary should be written next to `summary.json`.
    pub fn wants_markdown(&self) -> bool {
        self.formats.iter().any(|f| f.eq_ignore_ascii_case("md"))
    }
}

/// How targets are discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub use_sitemap: bool,
    pub max_pages: usize,
    /// Caller-supplied paths; when set, sitemap and defaults are ignored.
    pub explicit_paths: Option<Vec<String>>,
    /// Fallback paths from config.
    pub default_paths: Vec<String>,
}

/// Link checker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheckOptions {
    pub timeout_ms: u64,
    pub concurrency: usize,
    pub skip: Vec<String>,
    /// Report and count only links on the base URL's origin.
    pub internal_only: bool,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub build_command: String,
    pub build_env: BTreeMap<String, String>,
    pub host: String,
    pub port: Option<u16>,
    pub crawl: CrawlOptions,
    pub thresholds: Thresholds,
    pub reports: ReportOptions,
    pub links: LinkCheckOptions,
    pub accessibility: AccessibilityConfig,
    pub tools: ToolsConfig,
    pub skip_build: bool,
    pub skip_serve: bool,
    pub soft_fail: bool,
    /// Externally supplied base URL; bypasses build and serve.
    pub base_url: Option<String>,
}

/// Command-line overrides applied on top of the config file.
///
/// `None` / `false` leaves the config value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub formats: Option<Vec<String>>,
    pub lighthouse_output: Option<ReportMode>,
    pub include_details: bool,
    pub include_screenshots: bool,
    pub gzip: bool,
    pub soft_fail: bool,
    pub max_pages: Option<usize>,
    pub paths: Option<Vec<String>>,
    pub no_sitemap: bool,
    pub a11y_output: Option<ReportMode>,
    pub a11y_include_details: bool,
    pub links_output: Option<ReportMode>,
    pub links_internal_only: bool,
    pub links_include_details: bool,
    pub links_timeout_ms: Option<u64>,
    pub links_concurrency: Option<usize>,
    pub html_output: Option<ReportMode>,
    pub html_include_details: bool,
    pub skip_build: bool,
    pub skip_serve: bool,
}

impl RunOptions {
    /// Merge a loaded config with command-line overrides.
    pub fn resolve(config: AuditConfig, overrides: Overrides) -> Self {
        let explicit_paths = overrides
            .paths
            .map(|paths| {
                paths
                    .into_iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|paths| !paths.is_empty());

        let crawl = CrawlOptions {
            use_sitemap: config.crawl.use_sitemap && !overrides.no_sitemap,
            max_pages: overrides.max_pages.unwrap_or(config.crawl.max_pages),
            explicit_paths,
            default_paths: config.crawl.paths,
        };

        let reports = ReportOptions {
            out_dir: overrides.out_dir.unwrap_or(config.reports.out_dir),
            formats: overrides.formats.unwrap_or(config.reports.formats),
            lighthouse: LighthouseReportOptions {
                verbosity: Verbosity {
                    mode: overrides.lighthouse_output.unwrap_or_default(),
                    include_details: overrides.include_details,
                },
                include_screenshots: overrides.include_screenshots,
                gzip: overrides.gzip,
            },
            accessibility: Verbosity {
                mode: overrides.a11y_output.unwrap_or_default(),
                include_details: overrides.a11y_include_details,
            },
            links: Verbosity {
                mode: overrides.links_output.unwrap_or_default(),
                include_details: overrides.links_include_details,
            },
            html: Verbosity {
                mode: overrides.html_output.unwrap_or_default(),
                include_details: overrides.html_include_details,
            },
        };

        let LinksConfig {
            timeout_ms,
            concurrency,
            skip,
        } = config.links;
        let links = LinkCheckOptions {
            timeout_ms: overrides.links_timeout_ms.unwrap_or(timeout_ms),
            concurrency: overrides.links_concurrency.unwrap_or(concurrency),
            skip,
            internal_only: overrides.links_internal_only,
        };

        Self {
            source_dir: config.site.source_dir,
            build_dir: config.site.build_dir,
            build_command: config.site.build_command,
            build_env: config.site.build_env,
            host: config.server.host,
            port: config.server.port,
            crawl,
            thresholds: config.thresholds,
            reports,
            links,
            accessibility: config.accessibility,
            tools: config.tools,
            skip_build: overrides.skip_build,
            skip_serve: overrides.skip_serve,
            soft_fail: overrides.soft_fail,
            base_url: overrides
                .base_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        }
    }

    /// Lighthouse categories to request: the ones that carry a threshold.
    pub fn lighthouse_categories(&self) -> Vec<String> {
        self.thresholds.lighthouse.keys().cloned().collect()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::resolve(AuditConfig::default(), Overrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_mode_from_str() {
        assert_eq!("summary".parse::<ReportMode>(), Ok(ReportMode::Summary));
        assert_eq!("FULL".parse::<ReportMode>(), Ok(ReportMode::Full));
        assert!("verbose".parse::<ReportMode>().is_err());
    }

    #[test]
    fn test_defaults_resolve() {
        let opts = RunOptions::default();
        assert_eq!(opts.crawl.max_pages, 50);
        assert!(opts.crawl.use_sitemap);
        assert!(opts.crawl.explicit_paths.is_none());
        assert_eq!(opts.reports.lighthouse.verbosity.mode, ReportMode::Summary);
        assert_eq!(opts.links.concurrency, 100);
        assert!(!opts.soft_fail);
        assert!(opts.base_url.is_none());
    }

    #[test]
    fn test_overrides_win() {
        let opts = RunOptions::resolve(
            AuditConfig::default(),
            Overrides {
                max_pages: Some(3),
                no_sitemap: true,
                out_dir: Some(PathBuf::from("out")),
                links_timeout_ms: Some(500),
                soft_fail: true,
                ..Overrides::default()
            },
        );
        assert_eq!(opts.crawl.max_pages, 3);
        assert!(!opts.crawl.use_sitemap);
        assert_eq!(opts.reports.out_dir, PathBuf::from("out"));
        assert_eq!(opts.links.timeout_ms, 500);
        assert!(opts.soft_fail);
    }

    #[test]
    fn test_blank_paths_are_dropped() {
        let opts = RunOptions::resolve(
            AuditConfig::default(),
            Overrides {
                paths: Some(vec![" ".to_string(), "".to_string()]),
                ..Overrides::default()
            },
        );
        assert!(opts.crawl.explicit_paths.is_none());

        let opts = RunOptions::resolve(
            AuditConfig::default(),
            Overrides {
                paths: Some(vec![" /about ".to_string(), "".to_string()]),
                ..Overrides::default()
            },
        );
        assert_eq!(opts.crawl.explicit_paths, Some(vec!["/about".to_string()]));
    }

    #[test]
    fn test_blank_base_url_is_ignored() {
        let opts = RunOptions::resolve(
            AuditConfig::default(),
            Overrides {
                base_url: Some("  ".to_string()),
                ..Overrides::default()
            },
        );
        assert!(opts.base_url.is_none());
    }

    #[test]
    fn test_full_payload_needs_details_flag() {
        let full_only = Verbosity {
            mode: ReportMode::Full,
            include_details: false,
        };
        assert!(!full_only.wants_full_payload());
        let full = Verbosity {
            mode: ReportMode::Full,
            include_details: true,
        };
        assert!(full.wants_full_payload());
    }

    #[test]
    fn test_gzip_only_in_full_mode() {
        let mut lh = LighthouseReportOptions {
            gzip: true,
            ..LighthouseReportOptions::default()
        };
        assert!(!lh.gzip_enabled());
        lh.verbosity.mode = ReportMode::Full;
        assert!(lh.gzip_enabled());
    }

    #[test]
    fn test_lighthouse_categories_follow_thresholds() {
        let opts = RunOptions::default();
        assert_eq!(
            opts.lighthouse_categories(),
            vec!["best-practices", "performance", "seo"]
        );
    }

    #[test]
    fn test_markdown_format_detection() {
        let opts = RunOptions::resolve(
            AuditConfig::default(),
            Overrides {
                formats: Some(vec!["json".to_string(), "MD".to_string()]),
                ..Overrides::default()
            },
        );
        assert!(opts.reports.wants_markdown());
        assert!(!RunOptions::default().reports.wants_markdown());
    }
}
