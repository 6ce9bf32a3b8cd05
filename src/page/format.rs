//! HTML formatting for bundled documents.
//!
//! Only the build path formats; the dev server serves raw renders.

use crate::config::FormatterConfig;
use crate::utils::exec::{CommandLine, ExecError};
use std::{ffi::OsString, path::PathBuf};

/// Pretty-prints rendered markup into a stable, diff-friendly shape.
pub trait Formatter: Send + Sync {
    fn format(&self, html: &str) -> Result<String, ExecError>;
}

/// Fixed formatting options applied to every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Wide enough to effectively disable line wrapping.
    pub print_width: u32,
    pub use_tabs: bool,
    pub single_quote: bool,
}

/// HTML parser, 10 000 columns, double quotes, tabs.
pub const HTML_OPTIONS: FormatOptions = FormatOptions {
    print_width: 10_000,
    use_tabs: true,
    single_quote: false,
};

impl FormatOptions {
    /// Prettier CLI flags for these options.
    fn to_args(self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--parser".into(),
            "html".into(),
            "--print-width".into(),
            self.print_width.to_string().into(),
        ];
        if self.use_tabs {
            args.push("--use-tabs".into());
        }
        if self.single_quote {
            args.push("--single-quote".into());
        }
        args
    }
}

/// Formats by piping markup through the `prettier` CLI.
#[derive(Debug, Clone)]
pub struct PrettierFormatter {
    command: CommandLine,
    root: PathBuf,
    args: Vec<OsString>,
}

impl PrettierFormatter {
    pub fn new(config: &FormatterConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            command: CommandLine::new(&config.command),
            root: root.into(),
            args: HTML_OPTIONS.to_args(),
        }
    }
}

impl Formatter for PrettierFormatter {
    fn format(&self, html: &str) -> Result<String, ExecError> {
        self.command
            .run(&self.root, &self.args, Some(html.as_bytes()), None)
    }
}
