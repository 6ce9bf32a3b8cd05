//! Page discovery, routing policy and rendering.
//!
//! - **policy**: which paths are pages, and how paths map to identities
//! - **entries**: the build entry map for the bundler
//! - **render**: module execution and export normalization
//! - **format**: HTML formatting for bundled documents

pub mod entries;
pub mod error;
pub mod format;
pub mod policy;
pub mod render;

pub use entries::{EntryMap, collect_entries};
pub use error::RenderError;
pub use format::{Formatter, PrettierFormatter};
pub use policy::{PageId, PageRoot};
pub use render::{CommandLoader, Markup, ModuleLoader, Renderer};
