//! Build entry enumeration.
//!
//! Walks the page root once and maps every page identity to the document
//! the bundler should emit for it:
//!
//! ```text
//! pages/index.ts          →  "index"      : <root>/index.html
//! pages/blog/post.ts      →  "blog/post"  : <root>/blog/post.html
//! pages/_layout.ts        →  (partial, skipped)
//! pages/_parts/nav.ts     →  (partial, skipped)
//! ```
//!
//! The map is a pure value; installing it into the host configuration is a
//! separate merge step (see [`crate::host::HostConfig::merge_entries`]).

use super::policy::{PageId, PageRoot};
use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

/// Page identity → absolute output document path.
///
/// Ordered, so two enumerations of the same tree serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EntryMap(BTreeMap<PageId, PathBuf>);

impl EntryMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PageId, &Path)> {
        self.0.iter().map(|(id, path)| (id, path.as_path()))
    }
}

impl FromIterator<(PageId, PathBuf)> for EntryMap {
    fn from_iter<I: IntoIterator<Item = (PageId, PathBuf)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Enumerate all page sources under the root and map them to documents.
///
/// A missing root yields an empty map. Hidden files and directories (leading
/// `.`) are not considered, matching how globbing treats them. Symbolic links
/// are followed, so a linked source is a page exactly when the dev router
/// would serve it; link cycles and dangling links are skipped.
pub fn collect_entries(root: &PageRoot) -> Result<EntryMap> {
    if !root.dir().is_dir() {
        return Ok(EntryMap::default());
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(root.dir())
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.loop_ancestor().is_some() || is_dangling(&err) => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to walk {}", root.dir().display()));
            }
        };
        if is_source(&entry, root) {
            entries.push(entry.into_path());
        }
    }

    Ok(entries
        .iter()
        .filter_map(|source| root.page_id(source))
        .map(|id| {
            let document = root.document_path(&id);
            (id, document)
        })
        .filter(|(_, document)| root.is_page(document))
        .collect())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// A link whose target is gone. The router's `is_file` check rejects these too.
fn is_dangling(err: &walkdir::Error) -> bool {
    err.path()
        .is_some_and(|path| path.symlink_metadata().is_ok() && !path.exists())
}

fn is_source(entry: &DirEntry, root: &PageRoot) -> bool {
    entry.file_type().is_file()
        && entry
            .path()
            .extension()
            .is_some_and(|ext| ext == root.source_ext())
}
