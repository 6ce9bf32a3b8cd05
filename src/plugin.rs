//! The pages plugin: lifecycle hooks the host calls into.
//!
//! # Hooks
//!
//! | Hook               | When                    | Does                                   |
//! |--------------------|-------------------------|----------------------------------------|
//! | `config`           | before a run            | contributes build entries (build only) |
//! | `handle_request`   | every dev request       | serves a page or falls through         |
//! | `resolve_id`       | bundler resolution      | claims page documents                  |
//! | `load`             | bundler load            | renders + formats a claimed document   |
//! | `on_change`        | watcher event           | broadcasts a full reload               |
//!
//! `handle_request` and `resolve_id`/`load` accept exactly the identities the
//! entry enumeration produces: all of them go through [`PageRoot::is_page`].

use crate::config::SiteConfig;
use crate::host::{HostConfig, Mode};
use crate::page::{
    CommandLoader, Formatter, PageId, PageRoot, PrettierFormatter, RenderError, Renderer,
    collect_entries,
};
use crate::reload::Broadcast;
use anyhow::Result;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// A rendered page ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl PageResponse {
    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html",
            body,
        }
    }
}

pub struct PagesPlugin {
    root: PageRoot,
    renderer: Renderer,
    formatter: Arc<dyn Formatter>,
}

impl PagesPlugin {
    pub fn new(root: PageRoot, renderer: Renderer, formatter: Arc<dyn Formatter>) -> Self {
        Self {
            root,
            renderer,
            formatter,
        }
    }

    /// Wire the plugin to the command loader and prettier from config.
    pub fn from_config(config: &SiteConfig) -> Self {
        let loader = CommandLoader::new(&config.loader);
        let formatter = PrettierFormatter::new(&config.formatter, &config.root);
        Self::new(
            PageRoot::from_config(&config.pages),
            Renderer::new(Arc::new(loader), &config.root),
            Arc::new(formatter),
        )
    }

    pub fn root(&self) -> &PageRoot {
        &self.root
    }

    /// Contribute the build entry map. Dev-server runs get nothing.
    pub fn config(&self, host: &mut HostConfig, mode: Mode) -> Result<()> {
        if mode != Mode::Build {
            return Ok(());
        }

        let entries = collect_entries(&self.root)?;
        host.merge_entries(entries);
        Ok(())
    }

    /// Dev-server middleware.
    ///
    /// `Ok(None)` means the request is not ours and must go to the next
    /// handler. Module failures propagate to the host's error surface.
    pub fn handle_request(&self, url: &str) -> Result<Option<PageResponse>, RenderError> {
        let Some(id) = PageId::from_request(url) else {
            return Ok(None);
        };

        let source = self.root.source_path(&id);
        if !source.is_file() || !self.root.is_page(&source) {
            return Ok(None);
        }

        let body = self.renderer.render(&source)?;
        Ok(Some(PageResponse::html(body)))
    }

    /// Claim `id` if it names a page document under the root.
    pub fn resolve_id(&self, id: &str) -> Option<String> {
        self.owns(Path::new(id)).then(|| id.to_owned())
    }

    /// Render and format a claimed document. `Ok(None)` if not ours.
    pub fn load(&self, id: &str) -> Result<Option<String>, RenderError> {
        let document = Path::new(id);
        if !self.owns(document) {
            return Ok(None);
        }

        let module = self.root.module_for_document(document);
        let html = self.renderer.render(&module)?;
        let formatted = self
            .formatter
            .format(&html)
            .map_err(|source| RenderError::Formatter {
                document: PathBuf::from(id),
                source,
            })?;

        Ok(Some(formatted))
    }

    /// Broadcast one full reload if any changed path lies under the root.
    ///
    /// Partials count too: they may be included by any number of pages.
    pub fn on_change(&self, paths: &[PathBuf], hub: &dyn Broadcast) -> bool {
        let relevant = paths
            .iter()
            .any(|path| path.is_absolute() && self.root.contains(path));

        if relevant {
            hub.full_reload();
        }
        relevant
    }

    fn owns(&self, path: &Path) -> bool {
        path.is_absolute() && self.root.is_page(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::page::{Markup, ModuleLoader};
    use crate::utils::exec::ExecError;
    use std::{
        fs,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::TempDir;

    /// Loader that reads a tiny export syntax straight from the page file:
    /// `static:<html>`, `lazy:<html>`, `throw:<message>`, anything else is
    /// a malformed export.
    pub struct FileLoader;

    impl ModuleLoader for FileLoader {
        fn load(&self, module: &Path, _cwd: &Path) -> Result<Markup, RenderError> {
            let source = fs::read_to_string(module).map_err(|err| RenderError::Loader {
                module: module.to_path_buf(),
                source: ExecError::Failed {
                    name: "fake".into(),
                    message: err.to_string(),
                },
            })?;

            if let Some(html) = source.strip_prefix("static:") {
                Ok(Markup::Static(html.to_owned()))
            } else if let Some(html) = source.strip_prefix("lazy:") {
                let html = html.to_owned();
                Ok(Markup::lazy(move || Ok(html)))
            } else if let Some(message) = source.strip_prefix("throw:") {
                Err(RenderError::Loader {
                    module: module.to_path_buf(),
                    source: ExecError::Failed {
                        name: "fake".into(),
                        message: message.to_owned(),
                    },
                })
            } else {
                Err(RenderError::MalformedExport {
                    module: module.to_path_buf(),
                    found: "object".into(),
                })
            }
        }
    }

    /// Formatter that indents every line with a tab.
    pub struct TabFormatter;

    impl Formatter for TabFormatter {
        fn format(&self, html: &str) -> Result<String, ExecError> {
            if html.contains("<broken") {
                return Err(ExecError::Failed {
                    name: "fake".into(),
                    message: "SyntaxError: Unexpected character".into(),
                });
            }
            Ok(html.lines().map(|l| format!("\t{l}\n")).collect())
        }
    }

    #[derive(Default)]
    pub struct CountingHub(pub AtomicUsize);

    impl CountingHub {
        pub fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Broadcast for CountingHub {
        fn full_reload(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn fixture(files: &[(&str, &str)]) -> (TempDir, PagesPlugin) {
        let dir = TempDir::new().unwrap();
        let pages = dir.path().join("pages");
        fs::create_dir_all(&pages).unwrap();
        for (rel, content) in files {
            let path = pages.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let plugin = PagesPlugin::new(
            PageRoot::new(&pages),
            Renderer::new(Arc::new(FileLoader), dir.path()),
            Arc::new(TabFormatter),
        );
        (dir, plugin)
    }

    fn example() -> (TempDir, PagesPlugin) {
        fixture(&[
            ("index.ts", "static:<h1>Home</h1>"),
            ("_layout.ts", "static:<main></main>"),
        ])
    }

    // ------------------------------------------------------------------------
    // config
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_contributes_entries_on_build() {
        let (_dir, plugin) = example();
        let mut host = HostConfig::default();
        plugin.config(&mut host, Mode::Build).unwrap();

        let input = host.input().unwrap();
        let ids: Vec<_> = input.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["index"]);
        let (_, document) = input.iter().next().unwrap();
        assert_eq!(document, plugin.root().dir().join("index.html"));
    }

    #[test]
    fn test_config_ignored_when_serving() {
        let (_dir, plugin) = example();
        let mut host = HostConfig::default();
        plugin.config(&mut host, Mode::Serve).unwrap();
        assert_eq!(host, HostConfig::default());
    }

    // ------------------------------------------------------------------------
    // handle_request
    // ------------------------------------------------------------------------

    #[test]
    fn test_request_for_page() {
        let (_dir, plugin) = example();
        let response = plugin.handle_request("/index").unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(response.body, "<h1>Home</h1>");
    }

    #[test]
    fn test_request_for_partial_falls_through() {
        let (_dir, plugin) = example();
        assert!(plugin.handle_request("/_layout").unwrap().is_none());
    }

    #[test]
    fn test_request_for_missing_page_falls_through() {
        let (_dir, plugin) = example();
        assert!(plugin.handle_request("/missing").unwrap().is_none());
        assert!(plugin.handle_request("/").unwrap().is_none());
        assert!(plugin.handle_request("/style.css").unwrap().is_none());
    }

    #[test]
    fn test_query_string_ignored() {
        let (_dir, plugin) = example();
        let plain = plugin.handle_request("/index").unwrap();
        let query = plugin.handle_request("/index?x=1").unwrap();
        assert_eq!(plain, query);
    }

    #[test]
    fn test_request_escaping_root_falls_through() {
        let (dir, plugin) = example();
        fs::write(dir.path().join("secret.ts"), "static:<p>secret</p>").unwrap();
        assert!(plugin.handle_request("/../secret").unwrap().is_none());
        assert!(plugin.handle_request("/%2E%2E/secret").unwrap().is_none());
    }

    #[test]
    fn test_request_for_nested_private_dir_falls_through() {
        let (_dir, plugin) = fixture(&[
            ("blog/_drafts/wip.ts", "static:<p>wip</p>"),
            ("blog/post.ts", "static:<p>post</p>"),
        ]);
        assert!(plugin.handle_request("/blog/_drafts/wip").unwrap().is_none());
        let response = plugin.handle_request("/blog/post").unwrap().unwrap();
        assert_eq!(response.body, "<p>post</p>");
    }

    #[test]
    fn test_lazy_export_rendered() {
        let (_dir, plugin) = fixture(&[("lazy.ts", "lazy:<p>y</p>")]);
        let response = plugin.handle_request("/lazy").unwrap().unwrap();
        assert_eq!(response.body, "<p>y</p>");
    }

    #[test]
    fn test_module_failure_propagates() {
        let (_dir, plugin) = fixture(&[("boom.ts", "throw:ReferenceError: x is not defined")]);
        let err = plugin.handle_request("/boom").unwrap_err();
        assert!(matches!(err, RenderError::Loader { .. }));
    }

    #[test]
    fn test_malformed_export_fails_loudly() {
        let (_dir, plugin) = fixture(&[("odd.ts", "{}")]);
        let err = plugin.handle_request("/odd").unwrap_err();
        assert!(err.to_string().contains("odd.ts"));
    }

    #[test]
    fn test_dev_routing_matches_build_entries() {
        let (_dir, plugin) = fixture(&[
            ("index.ts", "static:a"),
            ("about.ts", "static:b"),
            ("_layout.ts", "static:c"),
            ("blog/post.ts", "static:d"),
            ("blog/_card.ts", "static:e"),
            ("_parts/nav.ts", "static:f"),
            (".draft.ts", "static:g"),
            (".cache/page.ts", "static:h"),
            ("blog/.wip/post.ts", "static:i"),
        ]);
        let mut host = HostConfig::default();
        plugin.config(&mut host, Mode::Build).unwrap();
        let input = host.input().unwrap();

        for id in [
            "index",
            "about",
            "_layout",
            "blog/post",
            "blog/_card",
            "_parts/nav",
            ".draft",
            ".cache/page",
            "blog/.wip/post",
        ] {
            let routed = plugin.handle_request(&format!("/{id}")).unwrap().is_some();
            let listed = input.iter().any(|(entry, _)| entry.as_str() == id);
            assert_eq!(routed, listed, "{id}");
        }
        assert_eq!(input.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_dev_routing_matches_build_entries_through_symlinks() {
        use std::os::unix::fs::symlink;

        let (dir, plugin) = fixture(&[("index.ts", "static:a")]);
        let pages = plugin.root().dir();
        fs::write(dir.path().join("outside.ts"), "static:<p>linked</p>").unwrap();
        fs::create_dir_all(dir.path().join("shared")).unwrap();
        fs::write(dir.path().join("shared/card.ts"), "static:<p>card</p>").unwrap();
        symlink(dir.path().join("outside.ts"), pages.join("linked.ts")).unwrap();
        symlink(dir.path().join("shared"), pages.join("shared")).unwrap();
        symlink(dir.path().join("missing.ts"), pages.join("dangling.ts")).unwrap();

        let mut host = HostConfig::default();
        plugin.config(&mut host, Mode::Build).unwrap();
        let input = host.input().unwrap();

        for id in ["index", "linked", "shared/card", "dangling"] {
            let routed = plugin.handle_request(&format!("/{id}")).unwrap().is_some();
            let listed = input.iter().any(|(entry, _)| entry.as_str() == id);
            assert_eq!(routed, listed, "{id}");
        }
        let response = plugin.handle_request("/linked").unwrap().unwrap();
        assert_eq!(response.body, "<p>linked</p>");
    }

    // ------------------------------------------------------------------------
    // resolve_id / load
    // ------------------------------------------------------------------------

    #[test]
    fn test_resolve_id_claims_pages_only() {
        let (_dir, plugin) = example();
        let index = plugin.root().dir().join("index.html");
        let layout = plugin.root().dir().join("_layout.html");
        let index = index.to_str().unwrap();

        assert_eq!(plugin.resolve_id(index).as_deref(), Some(index));
        assert!(plugin.resolve_id(layout.to_str().unwrap()).is_none());
        assert!(plugin.resolve_id("/somewhere/else/index.html").is_none());
        assert!(plugin.resolve_id("index.html").is_none());
    }

    #[test]
    fn test_load_formats_output() {
        let (_dir, plugin) = example();
        let id = plugin.root().dir().join("index.html");
        let html = plugin.load(id.to_str().unwrap()).unwrap().unwrap();
        assert_eq!(html, "\t<h1>Home</h1>\n");
    }

    #[test]
    fn test_dev_output_is_unformatted() {
        let (_dir, plugin) = fixture(&[("page.ts", "static:<div>\n<p>x</p>\n</div>")]);
        let id = plugin.root().dir().join("page.html");

        let built = plugin.load(id.to_str().unwrap()).unwrap().unwrap();
        let served = plugin.handle_request("/page").unwrap().unwrap().body;

        assert_eq!(served, "<div>\n<p>x</p>\n</div>");
        assert_eq!(built, "\t<div>\n\t<p>x</p>\n\t</div>\n");
    }

    #[test]
    fn test_load_unclaimed_is_none() {
        let (_dir, plugin) = example();
        let id = plugin.root().dir().join("_layout.html");
        assert!(plugin.load(id.to_str().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_formatter_failure_propagates() {
        let (_dir, plugin) = fixture(&[("bad.ts", "static:<broken")]);
        let id = plugin.root().dir().join("bad.html");
        let err = plugin.load(id.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, RenderError::Formatter { .. }));
    }

    // ------------------------------------------------------------------------
    // on_change
    // ------------------------------------------------------------------------

    #[test]
    fn test_change_under_root_reloads_once() {
        let (_dir, plugin) = example();
        let hub = CountingHub::default();
        let index = plugin.root().dir().join("index.ts");
        let layout = plugin.root().dir().join("_layout.ts");

        assert!(plugin.on_change(&[index.clone()], &hub));
        assert_eq!(hub.0.load(Ordering::SeqCst), 1);

        // partials reload too, and one event is one broadcast
        assert!(plugin.on_change(&[layout, index], &hub));
        assert_eq!(hub.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_change_outside_root_is_ignored() {
        let (dir, plugin) = example();
        let hub = CountingHub::default();
        assert!(!plugin.on_change(&[dir.path().join("vite.config.ts")], &hub));
        assert!(!plugin.on_change(&[], &hub));
        assert_eq!(hub.0.load(Ordering::SeqCst), 0);
    }
}
