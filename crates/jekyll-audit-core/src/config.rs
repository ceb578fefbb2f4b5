//! Configuration file schema and loading.
//!
//! The file is optional. Every field has a default so a partial file (or
//! none at all) yields a complete [`AuditConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::context::ExecContext;
use crate::error::{AuditError, Result};

/// File names probed, in order, when no explicit config path is given.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "jekyll-audit.config.json",
    "jekyll-audit.config.yaml",
    "jekyll-audit.config.yml",
];

/// Complete configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    #[serde(alias = "jekyll")]
    pub site: SiteConfig,
    pub server: ServerConfig,
    pub crawl: CrawlConfig,
    pub thresholds: Thresholds,
    pub reports: ReportsConfig,
    pub links: LinksConfig,
    pub accessibility: AccessibilityConfig,
    pub tools: ToolsConfig,
}

/// Static site sources, output and build command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteConfig {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub build_command: String,
    /// Variables marking a production build.
    pub build_env: BTreeMap<String, String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            build_dir: PathBuf::from("_site"),
            build_command: "bundle exec jekyll build".to_string(),
            build_env: BTreeMap::from([("JEKYLL_ENV".to_string(), "production".to_string())]),
        }
    }
}

/// Local static server address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    /// `None` lets the OS pick a free port.
    pub port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
        }
    }
}

/// Page discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrawlConfig {
    pub use_sitemap: bool,
    pub max_pages: usize,
    pub paths: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            use_sitemap: true,
            max_pages: 50,
            paths: vec!["/".to_string()],
        }
    }
}

/// Pass/fail limits per audit category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    /// Minimum Lighthouse category scores on a 0..1 scale. Categories left
    /// out of the file keep their default minimum.
    #[serde(deserialize_with = "lighthouse_over_defaults")]
    pub lighthouse: BTreeMap<String, f64>,
    pub accessibility: AccessibilityThreshold,
    pub links: LinksThreshold,
    pub html: HtmlThreshold,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            lighthouse: default_lighthouse_thresholds(),
            accessibility: AccessibilityThreshold::default(),
            links: LinksThreshold::default(),
            html: HtmlThreshold::default(),
        }
    }
}

fn default_lighthouse_thresholds() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("performance".to_string(), 0.8),
        ("seo".to_string(), 0.9),
        ("best-practices".to_string(), 0.9),
    ])
}

fn lighthouse_over_defaults<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<String, f64>::deserialize(deserializer)?;
    let mut merged = default_lighthouse_thresholds();
    merged.extend(configured);
    Ok(merged)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessibilityThreshold {
    pub max_issues: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinksThreshold {
    pub max_broken: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HtmlThreshold {
    pub max_errors: usize,
}

/// Report output location and formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportsConfig {
    /// Any of `json`, `md`. JSON artifacts are always written.
    pub formats: Vec<String>,
    pub out_dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            formats: vec!["json".to_string()],
            out_dir: PathBuf::from("reports"),
        }
    }
}

/// Link checker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinksConfig {
    pub timeout_ms: u64,
    pub concurrency: usize,
    /// URL patterns the link checker should not follow.
    pub skip: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            concurrency: 100,
            skip: Vec::new(),
        }
    }
}

/// Accessibility checker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessibilityConfig {
    pub standard: String,
    pub timeout_ms: u64,
}

impl Default for AccessibilityConfig {
    fn default() -> Self {
        Self {
            standard: "WCAG2AA".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Where the audit tools live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolsConfig {
    pub lighthouse: String,
    pub pa11y: String,
    pub linkinator: String,
    /// Nu HTML Checker endpoint.
    pub validator_url: String,
    /// Hard timeout per tool invocation; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            lighthouse: "lighthouse".to_string(),
            pa11y: "pa11y".to_string(),
            linkinator: "linkinator".to_string(),
            validator_url: "https://validator.w3.org/nu/".to_string(),
            timeout_secs: 600,
        }
    }
}

impl AuditConfig {
    /// Load the config named by `explicit`, or the first candidate found in
    /// the context directory. Falls back to defaults when nothing exists.
    pub fn load(ctx: &ExecContext, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let full = ctx.resolve(path);
            if !full.is_file() {
                return Err(AuditError::ConfigNotFound(full));
            }
            return Self::from_file(&full);
        }

        for candidate in CONFIG_CANDIDATES {
            let full = ctx.resolve(candidate);
            if full.is_file() {
                return Self::from_file(&full);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse one config file; YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: AuditConfig = if is_yaml {
            serde_yaml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        config.validate()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Reject values the pipeline cannot act on.
    pub fn validate(&self) -> Result<()> {
        for (category, min) in &self.thresholds.lighthouse {
            if !(0.0..=1.0).contains(min) {
                return Err(AuditError::Config(format!(
                    "thresholds.lighthouse.{} must be between 0 and 1, got {}",
                    category, min
                )));
            }
        }
        if self.crawl.max_pages == 0 {
            return Err(AuditError::Config(
                "crawl.maxPages must be at least 1".to_string(),
            ));
        }
        if self.site.build_command.trim().is_empty() {
            return Err(AuditError::Config(
                "site.buildCommand must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
