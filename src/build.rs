//! Bundle production.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── plugin.config(host, Build) ──► entry map merged into host config
//!     │
//!     ├── prepare_output()           ──► create / clean output directory
//!     │
//!     └── entries.par_iter()
//!             │
//!             └── resolve_id ─► load (render + format) ─► <output>/<id>.html
//! ```
//!
//! A failing page does not stop the others; every failure is reported and
//! the build fails once all pages have been attempted.

use crate::{
    config::SiteConfig,
    host::{HostConfig, Mode},
    log,
    page::PageId,
    plugin::PagesPlugin,
    utils::log::ProgressBars,
};
use anyhow::{Context, Result, anyhow, bail};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Build every page into `config.build.output`.
///
/// Returns the written document paths in entry order.
pub fn build_site(config: &SiteConfig) -> Result<Vec<PathBuf>> {
    let plugin = PagesPlugin::from_config(config);
    let mut host = HostConfig::from_site(config);
    build_with(&plugin, &mut host)
}

pub fn build_with(plugin: &PagesPlugin, host: &mut HostConfig) -> Result<Vec<PathBuf>> {
    plugin.config(host, Mode::Build)?;

    let out_dir = host
        .out_dir()
        .cloned()
        .ok_or_else(|| anyhow!("build output directory is not configured"))?;
    let clean = host.build.as_ref().is_some_and(|b| b.empty_out_dir);
    prepare_output(&out_dir, clean)?;

    let Some(input) = host.input().filter(|input| !input.is_empty()) else {
        log!("warn"; "no pages under {}", plugin.root().dir().display());
        return Ok(Vec::new());
    };
    let entries: Vec<(&PageId, &Path)> = input.iter().collect();

    log!("build"; "rendering {} pages", input.len());
    let progress = ProgressBars::new(&[("render", input.len())]);
    let failures = Mutex::new(Vec::new());

    let written: Vec<PathBuf> = entries
        .par_iter()
        .filter_map(|(id, document)| {
            let result = build_page(plugin, id, document, &out_dir);
            progress.inc(0);
            match result {
                Ok(path) => Some(path),
                Err(e) => {
                    failures.lock().push(((*id).clone(), e));
                    None
                }
            }
        })
        .collect();

    progress.finish();

    let mut failures = failures.into_inner();
    if !failures.is_empty() {
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, err) in &failures {
            log!("error"; "{id}: {err:#}");
        }
        bail!(
            "{} of {} pages failed to build",
            failures.len(),
            input.len()
        );
    }

    log!("build"; "wrote {} pages to {}", written.len(), out_dir.display());
    Ok(written)
}

/// Render one entry and write it under `out_dir`.
fn build_page(
    plugin: &PagesPlugin,
    id: &PageId,
    document: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let document = document
        .to_str()
        .with_context(|| format!("non UTF-8 document path: {}", document.display()))?;

    let resolved = plugin
        .resolve_id(document)
        .with_context(|| format!("{document} is not a page document"))?;
    let html = plugin
        .load(&resolved)?
        .with_context(|| format!("{resolved} was not loaded"))?;

    let target = out_dir.join(format!("{id}.{}", plugin.root().document_ext()));
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&target, html).with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(target)
}

/// Create the output directory, removing old contents first when `clean`.
fn prepare_output(output: &Path, clean: bool) -> Result<()> {
    if clean && output.exists() {
        fs::remove_dir_all(output).with_context(|| {
            format!("Failed to clear output directory: {}", output.display())
        })?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::tests::fixture;

    fn host(out: &Path, clean: bool) -> HostConfig {
        let mut host = HostConfig::default();
        host.build = Some(crate::host::BuildOptions {
            out_dir: Some(out.to_path_buf()),
            empty_out_dir: clean,
            bundle: None,
        });
        host
    }

    #[test]
    fn test_build_writes_pages_only() {
        let (dir, plugin) = fixture(&[
            ("index.ts", "static:<h1>Home</h1>"),
            ("blog/post.ts", "lazy:<p>post</p>"),
            ("_layout.ts", "static:<main></main>"),
        ]);
        let out = dir.path().join("dist");

        let written = build_with(&plugin, &mut host(&out, false)).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(fs::read_to_string(out.join("index.html")).unwrap(), "\t<h1>Home</h1>\n");
        assert_eq!(fs::read_to_string(out.join("blog/post.html")).unwrap(), "\t<p>post</p>\n");
        assert!(!out.join("_layout.html").exists());
    }

    #[test]
    fn test_build_continues_past_failures() {
        let (dir, plugin) = fixture(&[
            ("good.ts", "static:<p>ok</p>"),
            ("bad.ts", "throw:boom"),
            ("ugly.ts", "static:<broken"),
        ]);
        let out = dir.path().join("dist");

        let err = build_with(&plugin, &mut host(&out, false)).unwrap_err();
        assert!(err.to_string().contains("2 of 3"));
        assert!(out.join("good.html").is_file());
        assert!(!out.join("bad.html").exists());
        assert!(!out.join("ugly.html").exists());
    }

    #[test]
    fn test_clean_removes_stale_output() {
        let (dir, plugin) = fixture(&[("index.ts", "static:<p>x</p>")]);
        let out = dir.path().join("dist");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.html"), "old").unwrap();

        build_with(&plugin, &mut host(&out, true)).unwrap();
        assert!(!out.join("stale.html").exists());
        assert!(out.join("index.html").is_file());
    }

    #[test]
    fn test_without_clean_keeps_existing_files() {
        let (dir, plugin) = fixture(&[("index.ts", "static:<p>x</p>")]);
        let out = dir.path().join("dist");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("robots.txt"), "User-agent: *").unwrap();

        build_with(&plugin, &mut host(&out, false)).unwrap();
        assert!(out.join("robots.txt").is_file());
    }

    #[test]
    fn test_empty_root_builds_nothing() {
        let (dir, plugin) = fixture(&[("_only_partial.ts", "static:")]);
        let out = dir.path().join("dist");

        let written = build_with(&plugin, &mut host(&out, false)).unwrap();
        assert!(written.is_empty());
        assert!(out.is_dir());
    }

    #[test]
    fn test_missing_out_dir_is_an_error() {
        let (_dir, plugin) = fixture(&[("index.ts", "static:")]);
        assert!(build_with(&plugin, &mut HostConfig::default()).is_err());
    }
}
