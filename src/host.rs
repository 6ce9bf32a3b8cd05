//! Host build configuration.
//!
//! The slice of bundler configuration the page plugin contributes to. Every
//! nested section is optional so a plugin never assumes a structure exists;
//! [`HostConfig::merge_entries`] creates what is missing and leaves sibling
//! settings alone.

use crate::config::SiteConfig;
use crate::page::EntryMap;
use std::path::PathBuf;

/// How the host was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Producing a bundle.
    Build,
    /// Running the dev server.
    Serve,
}

/// Host configuration handed to plugins before a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub build: Option<BuildOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Bundle output directory.
    pub out_dir: Option<PathBuf>,
    /// Remove the output directory before writing.
    pub empty_out_dir: bool,
    pub bundle: Option<BundleOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOptions {
    /// Entry points: page identity → document path.
    pub input: Option<EntryMap>,
}

impl HostConfig {
    pub fn from_site(config: &SiteConfig) -> Self {
        Self {
            build: Some(BuildOptions {
                out_dir: Some(config.build.output.clone()),
                empty_out_dir: config.build.clean,
                bundle: None,
            }),
        }
    }

    /// Install `entries` as the bundle input, creating any missing sections.
    ///
    /// Replaces a previous input wholesale; nothing else is touched.
    pub fn merge_entries(&mut self, entries: EntryMap) {
        let build = self.build.get_or_insert_with(BuildOptions::default);
        let bundle = build.bundle.get_or_insert_with(BundleOptions::default);
        bundle.input = Some(entries);
    }

    /// The entries contributed so far, if any.
    pub fn input(&self) -> Option<&EntryMap> {
        self.build
            .as_ref()
            .and_then(|b| b.bundle.as_ref())
            .and_then(|b| b.input.as_ref())
    }

    pub fn out_dir(&self) -> Option<&PathBuf> {
        self.build.as_ref().and_then(|b| b.out_dir.as_ref())
    }
}
