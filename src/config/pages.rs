//! `[pages]` section configuration.
//!
//! Where page modules live and how their paths map to documents.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[pages]` section in tspages.toml.
///
/// # Example
/// ```toml
/// [pages]
/// dir = "src/pages"
/// private_prefix = "_"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PagesConfig {
    /// Page root, relative to the project root.
    #[serde(default = "defaults::pages::dir")]
    #[educe(Default = defaults::pages::dir())]
    pub dir: PathBuf,

    /// Extension of page modules, without the dot.
    #[serde(default = "defaults::pages::source_ext")]
    #[educe(Default = defaults::pages::source_ext())]
    pub source_ext: String,

    /// Extension of emitted documents, without the dot.
    #[serde(default = "defaults::pages::document_ext")]
    #[educe(Default = defaults::pages::document_ext())]
    pub document_ext: String,

    /// Path segments starting with this are private (partials, layouts).
    #[serde(default = "defaults::pages::private_prefix")]
    #[educe(Default = defaults::pages::private_prefix())]
    pub private_prefix: String,
}
