//! Target resolution: which URLs the per-page audits visit.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::options::CrawlOptions;

/// Where the resolved target list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    ExplicitPaths,
    Sitemap,
    DefaultPaths,
}

impl TargetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSource::ExplicitPaths => "explicit_paths",
            TargetSource::Sitemap => "sitemap",
            TargetSource::DefaultPaths => "default_paths",
        }
    }
}

/// Deduplicated, capped list of absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub source: TargetSource,
    pub urls: Vec<String>,
}

/// Decide the target list.
///
/// Explicit paths win over the sitemap, which wins over the configured
/// defaults. Duplicates are dropped (first occurrence kept) and the list is
/// truncated to `max_pages`, in that order.
pub fn resolve(build_dir: &Path, base_url: &str, crawl: &CrawlOptions) -> ResolvedTargets {
    let (source, urls) = if let Some(paths) = &crawl.explicit_paths {
        (TargetSource::ExplicitPaths, urls_from_paths(base_url, paths))
    } else if let Some(urls) = sitemap_targets(build_dir, crawl) {
        (TargetSource::Sitemap, urls)
    } else {
        (
            TargetSource::DefaultPaths,
            urls_from_paths(base_url, &crawl.default_paths),
        )
    };

    ResolvedTargets {
        source,
        urls: cap(dedup(urls), crawl.max_pages),
    }
}

fn sitemap_targets(build_dir: &Path, crawl: &CrawlOptions) -> Option<Vec<String>> {
    if !crawl.use_sitemap {
        return None;
    }
    let path = discover_sitemap(build_dir)?;
    match std::fs::read_to_string(&path) {
        Ok(xml) => Some(parse_sitemap_locs(&xml)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable sitemap, using default paths");
            None
        }
    }
}

/// Path of `sitemap.xml` in the build output, if present.
pub fn discover_sitemap(build_dir: &Path) -> Option<PathBuf> {
    let path = build_dir.join("sitemap.xml");
    path.is_file().then_some(path)
}

fn loc_pattern() -> &'static Regex {
    static LOC: OnceLock<Regex> = OnceLock::new();
    LOC.get_or_init(|| Regex::new(r"(?i)<loc>([^<]*)</loc>").expect("static regex"))
}

/// Extract every `<loc>` value in document order.
///
/// Not a full XML parser. Entries with an empty body or without a closing
/// tag before the next element are skipped.
pub fn parse_sitemap_locs(xml: &str) -> Vec<String> {
    loc_pattern()
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join each path onto `base_url`, normalising the slashes in between.
pub fn urls_from_paths(base_url: &str, paths: &[String]) -> Vec<String> {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    paths
        .iter()
        .map(|p| {
            if p.starts_with('/') {
                format!("{}{}", base, p)
            } else {
                format!("{}/{}", base, p)
            }
        })
        .collect()
}

fn dedup(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

fn cap(mut urls: Vec<String>, max_pages: usize) -> Vec<String> {
    urls.truncate(max_pages);
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn crawl(explicit: Option<&[&str]>, defaults: &[&str], max_pages: usize) -> CrawlOptions {
        CrawlOptions {
            use_sitemap: true,
            max_pages,
            explicit_paths: explicit.map(|p| p.iter().map(|s| s.to_string()).collect()),
            default_paths: defaults.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn write_sitemap(dir: &Path, locs: &[&str]) {
        let body: String = locs
            .iter()
            .map(|l| format!("  <url><loc>{}</loc></url>\n", l))
            .collect();
        std::fs::write(
            dir.join("sitemap.xml"),
            format!("<?xml version=\"1.0\"?>\n<urlset>\n{}</urlset>\n", body),
        )
        .expect("write sitemap");
    }

    #[test]
    fn test_urls_from_paths_normalises_slashes() {
        let urls = urls_from_paths("http://x/", &["/".to_string(), "about".to_string()]);
        assert_eq!(urls, vec!["http://x/", "http://x/about"]);
    }

    #[test]
    fn test_urls_from_paths_keeps_base_path() {
        let urls = urls_from_paths("http://x:4000/blog", &["posts/".to_string()]);
        assert_eq!(urls, vec!["http://x:4000/blog/posts/"]);
    }

    #[test]
    fn test_parse_sitemap_in_document_order() {
        let xml = "<urlset><url><loc>http://a/</loc></url>\n<url><LOC> http://a/b </LOC></url></urlset>";
        assert_eq!(parse_sitemap_locs(xml), vec!["http://a/", "http://a/b"]);
    }

    #[test]
    fn test_parse_sitemap_skips_malformed_entries() {
        let xml = "<loc></loc>\n<loc>   </loc>\n<loc>http://a/unterminated\n<loc>http://a/ok</loc>\n<loc>http://a/tail";
        assert_eq!(parse_sitemap_locs(xml), vec!["http://a/ok"]);
    }

    #[test]
    fn test_parse_sitemap_is_idempotent() {
        let xml = "<loc>http://a/1</loc><loc>http://a/2</loc>";
        assert_eq!(parse_sitemap_locs(xml), parse_sitemap_locs(xml));
    }

    #[test]
    fn test_explicit_paths_beat_sitemap_and_defaults() {
        let dir = TempDir::new().expect("tempdir");
        write_sitemap(dir.path(), &["http://site/from-sitemap"]);

        let resolved = resolve(
            dir.path(),
            "http://site",
            &crawl(Some(&["/explicit"]), &["/default"], 10),
        );
        assert_eq!(resolved.source, TargetSource::ExplicitPaths);
        assert_eq!(resolved.urls, vec!["http://site/explicit"]);
    }

    #[test]
    fn test_sitemap_beats_defaults() {
        let dir = TempDir::new().expect("tempdir");
        write_sitemap(dir.path(), &["http://site/a", "http://site/b"]);

        let resolved = resolve(dir.path(), "http://site", &crawl(None, &["/"], 10));
        assert_eq!(resolved.source, TargetSource::Sitemap);
        assert_eq!(resolved.urls, vec!["http://site/a", "http://site/b"]);
    }

    #[test]
    fn test_sitemap_disabled_falls_back_to_defaults() {
        let dir = TempDir::new().expect("tempdir");
        write_sitemap(dir.path(), &["http://site/a"]);

        let mut options = crawl(None, &["/", "contact"], 10);
        options.use_sitemap = false;
        let resolved = resolve(dir.path(), "http://site/", &options);
        assert_eq!(resolved.source, TargetSource::DefaultPaths);
        assert_eq!(resolved.urls, vec!["http://site/", "http://site/contact"]);
    }

    #[test]
    fn test_missing_sitemap_falls_back_to_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let resolved = resolve(dir.path(), "http://site", &crawl(None, &["/"], 10));
        assert_eq!(resolved.source, TargetSource::DefaultPaths);
        assert_eq!(resolved.urls, vec!["http://site/"]);
    }

    #[test]
    fn test_dedup_then_cap_preserves_order() {
        let dir = TempDir::new().expect("tempdir");
        write_sitemap(
            dir.path(),
            &["http://s/1", "http://s/2", "http://s/1", "http://s/3", "http://s/4"],
        );
        let resolved = resolve(dir.path(), "http://s", &crawl(None, &[], 3));
        assert_eq!(resolved.urls, vec!["http://s/1", "http://s/2", "http://s/3"]);
    }

    #[test]
    fn test_explicit_paths_are_capped() {
        let dir = TempDir::new().expect("tempdir");
        let resolved = resolve(
            dir.path(),
            "http://s",
            &crawl(Some(&["a", "b", "c"]), &[], 2),
        );
        assert_eq!(resolved.urls, vec!["http://s/a", "http://s/b"]);
    }
}
