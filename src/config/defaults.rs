//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [pages] Section Defaults
// ============================================================================

pub mod pages {
    use std::path::PathBuf;

    pub fn dir() -> PathBuf {
        "pages".into()
    }

    pub fn source_ext() -> String {
        "ts".into()
    }

    pub fn document_ext() -> String {
        "html".into()
    }

    pub fn private_prefix() -> String {
        "_".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn output() -> PathBuf {
        "dist".into()
    }
}

// ============================================================================
// [loader] / [formatter] Section Defaults
// ============================================================================

pub mod loader {
    pub fn command() -> Vec<String> {
        vec!["node".into()]
    }
}

pub mod formatter {
    pub fn command() -> Vec<String> {
        vec!["npx".into(), "prettier".into()]
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    use std::path::PathBuf;

    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        5173
    }

    pub fn public() -> PathBuf {
        "public".into()
    }
}
