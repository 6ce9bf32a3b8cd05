//! Project configuration for `tspages.toml`.
//!
//! # Sections
//!
//! | Section       | Purpose                                       |
//! |---------------|-----------------------------------------------|
//! | `[pages]`     | Page root, extensions, private prefix         |
//! | `[build]`     | Bundle output directory                       |
//! | `[loader]`    | Command that evaluates page modules           |
//! | `[formatter]` | Command that pretty-prints built documents    |
//! | `[serve]`     | Development server (port, interface, watch)   |
//!
//! Every section is optional; a project without `tspages.toml` runs on
//! defaults.
//!
//! # Example
//!
//! ```toml
//! [pages]
//! dir = "src/pages"
//!
//! [build]
//! output = "dist"
//!
//! [loader]
//! timeout = 30
//!
//! [serve]
//! port = 3000
//! ```

mod build;
pub mod defaults;
mod error;
mod loader;
mod pages;
mod serve;

pub use build::BuildConfig;
pub use error::ConfigError;
pub use loader::{FormatterConfig, LoaderConfig};
pub use pages::PagesConfig;
pub use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use crate::log;
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing tspages.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute project root (set after loading)
    #[serde(skip)]
    #[educe(Default = PathBuf::from("./"))]
    pub root: PathBuf,

    #[serde(default)]
    pub pages: PagesConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Read the config file named by the CLI (if present), apply overrides
    /// and validate.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        if config.config_path.is_file() {
            log!("config"; "{}", config.config_path.display());
        }
        config.validate()?;
        if !matches!(cli.command, Commands::Entries) {
            config.check_commands()?;
        }
        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("./"));

        Self::update_option(&mut self.pages.dir, cli.pages.as_ref());

        match &cli.command {
            Commands::Build { clean, output } => {
                Self::update_option(&mut self.build.output, output.as_ref());
                self.build.clean |= *clean;
            }
            Commands::Serve {
                interface,
                port,
                watch,
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            Commands::Entries => {}
        }

        self.update_path_with_root(&root, &cli.config);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve all paths against the root and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path, config: &Path) {
        let root = Self::normalize_path(root);

        self.config_path = Self::normalize_path(&root.join(config));
        self.pages.dir = Self::resolve(&root, &self.pages.dir);
        self.build.output = Self::resolve(&root, &self.build.output);
        self.serve.public = Self::resolve(&root, &self.serve.public);
        self.root = root;
    }

    /// Join `path` onto `root` after tilde expansion.
    fn resolve(root: &Path, path: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        Self::normalize_path(&root.join(expanded))
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("[pages.source_ext]", &self.pages.source_ext),
            ("[pages.document_ext]", &self.pages.document_ext),
            ("[pages.private_prefix]", &self.pages.private_prefix),
        ] {
            if value.is_empty() {
                bail!(ConfigError::Validation(format!("{field} must not be empty")));
            }
        }

        for (field, value) in [
            ("[pages.source_ext]", &self.pages.source_ext),
            ("[pages.document_ext]", &self.pages.document_ext),
        ] {
            if value.starts_with('.') || value.contains(['/', '\\']) {
                bail!(ConfigError::Validation(format!(
                    "{field} must be a bare extension like `ts`, got `{value}`"
                )));
            }
        }

        if self.pages.source_ext == self.pages.document_ext {
            bail!(ConfigError::Validation(
                "[pages.source_ext] and [pages.document_ext] must differ".into()
            ));
        }

        if self.pages.private_prefix.contains(['/', '\\']) {
            bail!(ConfigError::Validation(
                "[pages.private_prefix] must not contain a path separator".into()
            ));
        }

        if self.pages.dir.starts_with(&self.build.output) {
            bail!(ConfigError::Validation(
                "[pages.dir] must not live inside [build.output]".into()
            ));
        }

        Ok(())
    }

    /// Make sure the loader and formatter programs can be found.
    pub fn check_commands(&self) -> Result<()> {
        Self::check_command_installed("[loader.command]", &self.loader.command)?;
        Self::check_command_installed("[formatter.command]", &self.formatter.command)
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };

        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    /// A config whose commands resolve on any unix test host.
    fn valid() -> SiteConfig {
        let mut config = SiteConfig::default();
        config.loader.command = vec!["sh".into()];
        config.formatter.command = vec!["sh".into()];
        config
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SiteConfig::from_str("").unwrap();
        assert_eq!(config.pages.dir, PathBuf::from("pages"));
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.serve.port, 5173);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = SiteConfig::from_str("[extra]\nfoo = 1").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = SiteConfig::from_path(Path::new("/nonexistent/tspages.toml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Io(..))
        ));
    }

    #[test]
    fn test_cli_overrides_and_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from([
            "tspages", "--root", root, "--pages", "src/pages", "build", "--clean", "-o", "out",
        ]);

        let mut config = SiteConfig::default();
        config.update_with_cli(&cli);

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.root, root);
        assert_eq!(config.pages.dir, root.join("src/pages"));
        assert_eq!(config.build.output, root.join("out"));
        assert_eq!(config.serve.public, root.join("public"));
        assert_eq!(config.config_path, root.join("tspages.toml"));
        assert!(config.build.clean);
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["tspages", "serve", "-P", "8000", "-i", "0.0.0.0"]);
        let mut config = SiteConfig::default();
        config.update_with_cli(&cli);

        assert_eq!(config.serve.port, 8000);
        assert_eq!(config.serve.interface, "0.0.0.0");
        assert!(config.serve.watch);
    }

    #[test]
    fn test_file_values_survive_without_cli_flags() {
        let mut config = SiteConfig::from_str("[build]\nclean = true").unwrap();
        let cli = Cli::parse_from(["tspages", "build"]);
        config.update_with_cli(&cli);
        assert!(config.build.clean);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_reads_file_under_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("tspages.toml"),
            "[loader]\ncommand = [\"sh\"]\n[formatter]\ncommand = [\"sh\"]\n",
        )
        .unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["tspages", "--root", root, "entries"]);

        let config = SiteConfig::load(&cli).unwrap();
        assert_eq!(config.pages.dir, dir.path().canonicalize().unwrap().join("pages"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(valid().validate().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_available_commands_pass() {
        assert!(valid().check_commands().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_extensions() {
        let mut config = valid();
        config.pages.source_ext = ".ts".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.pages.document_ext = "ts".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.pages.private_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = valid();
        config.loader.command.clear();
        let err = config.check_commands().unwrap_err();
        assert!(err.to_string().contains("[loader.command]"));
    }

    #[test]
    fn test_validate_rejects_missing_command() {
        let mut config = valid();
        config.formatter.command = vec!["definitely-not-a-real-binary-4f1c".into()];
        assert!(config.check_commands().is_err());
    }

    #[test]
    fn test_validate_rejects_pages_inside_output() {
        let mut config = valid();
        config.build.output = "/site/dist".into();
        config.pages.dir = "/site/dist/pages".into();
        assert!(config.validate().is_err());
    }
}
