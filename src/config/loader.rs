//! `[loader]` and `[formatter]` section configuration.
//!
//! Both name external commands. The loader evaluates page modules, the
//! formatter pretty-prints built documents.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[loader]` section in tspages.toml.
///
/// # Example
/// ```toml
/// [loader]
/// command = ["node", "--conditions=development"]
/// timeout = 30
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Program and leading arguments.
    #[serde(default = "defaults::loader::command")]
    #[educe(Default = defaults::loader::command())]
    pub command: Vec<String>,

    /// Pass the built-in module shim to the command.
    ///
    /// Disable when `command` already prints the export descriptor JSON itself.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub shim: bool,

    /// Seconds before a module evaluation is abandoned, `0` waits forever.
    #[serde(default)]
    pub timeout: u64,
}

/// `[formatter]` section in tspages.toml.
///
/// The command reads HTML on stdin and writes the formatted result to stdout.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct FormatterConfig {
    #[serde(default = "defaults::formatter::command")]
    #[educe(Default = defaults::formatter::command())]
    pub command: Vec<String>,
}
