//! Page rendering error types.

use crate::utils::exec::ExecError;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Errors raised while turning a page module into a document.
///
/// A request or id that simply does not name a page is not an error; those
/// paths return `None` instead.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The module failed to load or threw while executing.
    #[error("failed to execute page module `{}`", module.display())]
    Loader {
        module: PathBuf,
        #[source]
        source: ExecError,
    },

    /// The loader answered, but not in a shape we understand.
    #[error("page module `{}` produced an unreadable loader response: {detail}", module.display())]
    Protocol { module: PathBuf, detail: String },

    /// Default export is neither a string nor a zero-argument function.
    #[error(
        "page module `{}` must default-export a string or a zero-argument function, found {found}",
        module.display()
    )]
    MalformedExport { module: PathBuf, found: String },

    /// Module execution outlived `[loader] timeout`.
    #[error("page module `{}` did not finish within {}s", module.display(), timeout.as_secs())]
    Timeout { module: PathBuf, timeout: Duration },

    /// The formatter rejected the rendered markup.
    #[error("failed to format `{}`", document.display())]
    Formatter {
        document: PathBuf,
        #[source]
        source: ExecError,
    },
}

impl RenderError {
    /// Wrap a loader command failure, promoting deadline expiry to `Timeout`.
    pub fn from_loader(module: PathBuf, err: ExecError) -> Self {
        match err {
            ExecError::TimedOut { timeout, .. } => Self::Timeout { module, timeout },
            source => Self::Loader { module, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_export_names_module() {
        let err = RenderError::MalformedExport {
            module: PathBuf::from("/site/pages/index.ts"),
            found: "number".into(),
        };
        let display = err.to_string();
        assert!(display.contains("/site/pages/index.ts"));
        assert!(display.contains("number"));
    }

    #[test]
    fn test_timeout_is_promoted() {
        let err = RenderError::from_loader(
            PathBuf::from("slow.ts"),
            ExecError::TimedOut {
                name: "node".into(),
                timeout: Duration::from_secs(3),
            },
        );
        assert!(matches!(err, RenderError::Timeout { .. }));
        assert!(err.to_string().contains("3s"));
    }

    #[test]
    fn test_loader_failure_keeps_source() {
        let err = RenderError::from_loader(
            PathBuf::from("broken.ts"),
            ExecError::Failed {
                name: "node".into(),
                message: "SyntaxError: Unexpected token".into(),
            },
        );
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("SyntaxError: Unexpected token"));
    }
}
