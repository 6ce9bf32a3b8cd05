//! Module loader bridge.
//!
//! Executes a page module through an external loader and normalizes its
//! default export into a document string.
//!
//! # Export shapes
//!
//! ```text
//! export default "<h1>Home</h1>";           → Markup::Static
//! export default () => render(expensive);   → Markup::Lazy
//! export default 42;                        → RenderError::MalformedExport
//! ```
//!
//! A lazy producer runs when [`Markup::into_html`] is called, exactly once
//! per render. [`CommandLoader`] runs it inside the same loader process that
//! imported the module, so every render executes the module once.

use super::error::RenderError;
use crate::config::LoaderConfig;
use crate::utils::exec::{CommandLine, FilterRule};
use serde::Deserialize;
use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// ESM shim that imports a module through `tsx` and reports its default export.
const LOADER_SHIM: &str = include_str!("../embed/loader.mjs");

/// Node prints these on stderr for perfectly healthy runs.
const NODE_FILTER: FilterRule = FilterRule::new(&[
    "(node:",
    "ExperimentalWarning",
    "(Use `node --trace-warnings",
]);

/// A page's default export, resolved to a string by a single match.
pub enum Markup {
    /// Precomputed markup.
    Static(String),
    /// Deferred markup, produced on demand.
    Lazy(Box<dyn FnOnce() -> Result<String, RenderError> + Send>),
}

impl Markup {
    pub fn lazy(producer: impl FnOnce() -> Result<String, RenderError> + Send + 'static) -> Self {
        Self::Lazy(Box::new(producer))
    }

    /// Resolve to the final document string.
    pub fn into_html(self) -> Result<String, RenderError> {
        match self {
            Self::Static(html) => Ok(html),
            Self::Lazy(producer) => producer(),
        }
    }
}

impl fmt::Debug for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(html) => f.debug_tuple("Static").field(html).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Executes a page module and hands back its default export.
///
/// `cwd` is the working-directory context the module resolves its own
/// imports against.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, module: &Path, cwd: &Path) -> Result<Markup, RenderError>;
}

/// Renders page modules: load, then normalize the export.
#[derive(Clone)]
pub struct Renderer {
    loader: Arc<dyn ModuleLoader>,
    cwd: PathBuf,
}

impl Renderer {
    pub fn new(loader: Arc<dyn ModuleLoader>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            cwd: cwd.into(),
        }
    }

    pub fn render(&self, module: &Path) -> Result<String, RenderError> {
        self.loader.load(module, &self.cwd)?.into_html()
    }
}

// ============================================================================
// Command Loader
// ============================================================================

/// What the loader command reports about a default export.
///
/// `lazy` carries what a zero-argument export returned when the loader
/// invoked it; any other `function` could not be called and is malformed.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ExportDescriptor {
    String { value: String },
    Lazy { value: String },
    Function { arity: usize },
    Other { r#type: String },
}

/// Loads modules by running an external command.
///
/// The command receives the module path as its last argument and must print
/// an [`ExportDescriptor`] as JSON. One run imports the module once and, for
/// a zero-argument export, also invokes it. With `shim` enabled the embedded
/// node script implementing this is passed ahead of the path.
#[derive(Debug, Clone)]
pub struct CommandLoader {
    command: CommandLine,
    prelude: Vec<OsString>,
    timeout: Option<Duration>,
}

impl CommandLoader {
    pub fn new(config: &LoaderConfig) -> Self {
        let prelude = if config.shim {
            ["--input-type=module", "--eval", LOADER_SHIM, "--"]
                .into_iter()
                .map(OsString::from)
                .collect()
        } else {
            Vec::new()
        };

        Self {
            command: CommandLine::new(&config.command).with_filter(&NODE_FILTER),
            prelude,
            timeout: (config.timeout > 0).then(|| Duration::from_secs(config.timeout)),
        }
    }

    fn run(&self, module: &Path, cwd: &Path) -> Result<String, RenderError> {
        let mut args = self.prelude.clone();
        args.push(module.as_os_str().to_owned());

        self.command
            .run(cwd, &args, None, self.timeout)
            .map_err(|err| RenderError::from_loader(module.to_path_buf(), err))
    }
}

impl ModuleLoader for CommandLoader {
    fn load(&self, module: &Path, cwd: &Path) -> Result<Markup, RenderError> {
        let raw = self.run(module, cwd)?;
        let descriptor: ExportDescriptor =
            serde_json::from_str(raw.trim()).map_err(|err| RenderError::Protocol {
                module: module.to_path_buf(),
                detail: err.to_string(),
            })?;

        match descriptor {
            ExportDescriptor::String { value } => Ok(Markup::Static(value)),
            ExportDescriptor::Lazy { value } => Ok(Markup::lazy(move || Ok(value))),
            ExportDescriptor::Function { arity } => Err(RenderError::MalformedExport {
                module: module.to_path_buf(),
                found: format!("a function taking {arity} arguments"),
            }),
            ExportDescriptor::Other { r#type } => Err(RenderError::MalformedExport {
                module: module.to_path_buf(),
                found: r#type,
            }),
        }
    }
}
