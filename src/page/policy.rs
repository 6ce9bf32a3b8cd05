//! Page naming policy.
//!
//! Decides which paths under the page root are routable *pages* and which are
//! *partials*, and maps between file paths and page identities.
//!
//! # Rules
//!
//! | Path (relative to root)   | Page? | Why                          |
//! |---------------------------|-------|------------------------------|
//! | `index.ts`                | yes   |                              |
//! | `blog/post.ts`            | yes   |                              |
//! | `_layout.ts`              | no    | private file stem            |
//! | `_components/nav.ts`      | no    | private directory            |
//! | `blog/_drafts/wip.ts`     | no    | private nested directory     |
//! | `.draft.ts`               | no    | hidden file                  |
//! | `.cache/page.ts`          | no    | hidden directory             |
//! | `../outside.ts`           | no    | not under the root           |
//!
//! Everything here is pure string/path manipulation. Nothing touches the
//! filesystem, so hypothetical output paths can be checked the same way as
//! real source files.

use crate::config::PagesConfig;
use serde::Serialize;
use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

/// Root-relative, extension-less, forward-slash separated page path.
///
/// `pages/blog/post.ts` under root `pages/` has identity `blog/post`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the identity a dev-server request asks for.
    ///
    /// Strips the query string and the leading `/`, then percent-decodes.
    /// `/about?x=1` → `about`. Returns `None` for the bare root `/`.
    pub fn from_request(url: &str) -> Option<Self> {
        let path = url.split('?').next().unwrap_or(url);
        let path = path.strip_prefix('/').unwrap_or(path);
        let decoded = urlencoding::decode(path).ok()?;

        if decoded.is_empty() {
            return None;
        }
        Some(Self(decoded.into_owned()))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The page directory plus the naming rules applied inside it.
///
/// Fixed at plugin construction and shared read-only by every component.
#[derive(Debug, Clone)]
pub struct PageRoot {
    dir: PathBuf,
    source_ext: String,
    document_ext: String,
    private_prefix: String,
}

impl PageRoot {
    /// Create a root with the default naming: `.ts` sources, `.html`
    /// documents, `_` marking partials.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: normalize_lexically(&dir.into()),
            source_ext: "ts".into(),
            document_ext: "html".into(),
            private_prefix: "_".into(),
        }
    }

    pub fn from_config(config: &PagesConfig) -> Self {
        Self {
            dir: normalize_lexically(&config.dir),
            source_ext: config.source_ext.clone(),
            document_ext: config.document_ext.clone(),
            private_prefix: config.private_prefix.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_ext(&self) -> &str {
        &self.source_ext
    }

    pub fn document_ext(&self) -> &str {
        &self.document_ext
    }

    /// Whether `path` lies under the root after lexical normalization.
    pub fn contains(&self, path: &Path) -> bool {
        self.segments(path).is_some()
    }

    /// Core routing predicate: true iff `path` is under the root and no
    /// segment of its root-relative form starts with the private prefix or
    /// with `.`.
    ///
    /// Relative paths are taken relative to the root. Hidden segments are
    /// excluded because entry enumeration never sees them.
    pub fn is_page(&self, path: &Path) -> bool {
        match self.segments(path) {
            Some(segments) if !segments.is_empty() => segments.iter().all(|segment| {
                !segment.starts_with(self.private_prefix.as_str()) && !segment.starts_with('.')
            }),
            _ => false,
        }
    }

    /// Identity of a file under the root: relative path, extension stripped.
    ///
    /// Only the last extension goes: `a.b.ts` → `a.b`.
    pub fn page_id(&self, path: &Path) -> Option<PageId> {
        let mut segments = self.segments(path)?;
        let stem = segments.pop()?;
        let stem = Path::new(&stem)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(stem);

        segments.push(stem);
        Some(PageId(segments.join("/")))
    }

    /// `<root>/<id>.<source_ext>`
    pub fn source_path(&self, id: &PageId) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.source_ext))
    }

    /// `<root>/<id>.<document_ext>`, the hypothetical document a page produces.
    pub fn document_path(&self, id: &PageId) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.document_ext))
    }

    /// Map a document path back to the module that renders it.
    ///
    /// Only a trailing document extension is swapped; any other path is
    /// assumed to already name the module.
    pub fn module_for_document(&self, document: &Path) -> PathBuf {
        if document
            .extension()
            .is_some_and(|ext| ext == self.document_ext.as_str())
        {
            document.with_extension(&self.source_ext)
        } else {
            document.to_path_buf()
        }
    }

    /// Root-relative segments of `path`, or `None` when it escapes the root.
    fn segments(&self, path: &Path) -> Option<Vec<String>> {
        let absolute = if path.is_absolute() {
            normalize_lexically(path)
        } else {
            normalize_lexically(&self.dir.join(path))
        };

        let relative = absolute.strip_prefix(&self.dir).ok()?;
        relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    }
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` at the top of a path is dropped, so `/a/../../b` becomes `/b`.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
