//! TOML-based configuration for the lbdevtools commands.
//!
//! The file is optional: every field has a default, so a missing file
//! yields [`ToolsConfig::default`]. Secrets (the GitLab token) are never
//! written to the file; the `token_env` field names the environment variable
//! holding them and [`ToolsConfig::resolve_env_vars`] fills the resolved
//! field at runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::git::protocol::Protocol;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "LBDEVTOOLS_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// GitLab server settings.
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Git remote settings.
    #[serde(default)]
    pub git: GitConfig,

    /// Release notes layout.
    #[serde(default)]
    pub release_notes: ReleaseNotesConfig,
}

// ---------------------------------------------------------------------------
// GitLab
// ---------------------------------------------------------------------------

/// GitLab server and API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Base URL of the GitLab instance.
    #[serde(default = "default_gitlab_url")]
    pub url: String,

    /// Environment variable holding the personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_gitlab_url() -> String {
    "https://gitlab.cern.ch".into()
}
fn default_token_env() -> String {
    "GITLAB_TOKEN".into()
}
fn default_timeout() -> u64 {
    30
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: default_gitlab_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

impl GitLabConfig {
    /// Host part of [`url`](Self::url), used to recognise remotes.
    pub fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        without_scheme
            .split(&['/', ':'][..])
            .next()
            .unwrap_or(without_scheme)
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Git remote configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitConfig {
    /// Protocol used by `lb-use` when neither the command line nor the
    /// repository's `lb-use.protocol` setting pick one.
    #[serde(default)]
    pub protocol: Protocol,
}

// ---------------------------------------------------------------------------
// Release notes
// ---------------------------------------------------------------------------

/// A titled group of merge requests in the rendered notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionConfig {
    /// Heading printed above the entries.
    pub title: String,

    /// Alternatives of label conjunctions: `[["a"], ["b", "c"]]` matches an
    /// MR labelled `a`, or labelled both `b` and `c`. `[[]]` matches all.
    pub labels: Vec<Vec<String>>,
}

/// Release notes layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseNotesConfig {
    /// Output path pattern; `{repo}` and `{target}` are substituted.
    #[serde(default = "default_output")]
    pub output: String,

    /// Sections in rendering order. An MR lands in the first matching one.
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionConfig>,

    /// Labels ordering entries inside a section.
    #[serde(default = "default_label_order")]
    pub label_order: Vec<String>,

    /// Label selecting upstream MRs worth repeating downstream.
    #[serde(default = "default_highlight_label")]
    pub highlight_label: String,
}

fn default_output() -> String {
    "{repo}/ReleaseNotes/{target}.md".into()
}

fn default_sections() -> Vec<SectionConfig> {
    let section = |title: &str, labels: &[&[&str]]| SectionConfig {
        title: title.into(),
        labels: labels
            .iter()
            .map(|set| set.iter().map(|l| l.to_string()).collect())
            .collect(),
    };
    vec![
        section("New features", &[&["new feature"]]),
        section("Fixes", &[&["bug fix"]]),
        section("Enhancements", &[&["enhancement"]]),
        section("Code cleanups and changes to tests", &[&["cleanup"], &["testing"]]),
        section("Documentation", &[&["documentation"]]),
        section("Other", &[&[]]),
    ]
}

fn default_label_order() -> Vec<String> {
    [
        "Configuration",
        "Decoding",
        "Tracking",
        "PV",
        "Calo",
        "Muon",
        "PID",
        "Composites",
        "Filters",
        "Functors",
        "Build",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_highlight_label() -> String {
    "highlight".into()
}

impl Default for ReleaseNotesConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            sections: default_sections(),
            label_order: default_label_order(),
            highlight_label: default_highlight_label(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl ToolsConfig {
    /// Default location: `$LBDEVTOOLS_CONFIG`, else
    /// `<config dir>/lbdevtools/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|dir| dir.join("lbdevtools").join("config.toml"))
    }

    /// Load a [`ToolsConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ToolsConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load the file at `path` (or the default location) if it exists,
    /// falling back to defaults otherwise. Parse errors are still reported.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => return Ok(Self::default()),
        };
        match Self::load_from_file(&path) {
            Ok(config) => Ok(config),
            Err(ConfigError::FileNotFound(_)) => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the `token_env` reference. A missing variable only warns:
    /// GitLab queries still run unauthenticated with reduced features.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.gitlab.token = resolve_optional_env(&self.gitlab.token_env, "gitlab.token_env");
        Ok(())
    }

    /// Validate that values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gitlab.url.starts_with("https://") || self.gitlab.url.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.url".into(),
                detail: "GitLab URL must start with http:// or https://".into(),
            });
        }
        if self.gitlab.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if self.release_notes.sections.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "release_notes.sections".into(),
                detail: "at least one section is required".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            debug!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[gitlab]
url = "https://gitlab.example.org/"
token_env = "MY_GL_TOKEN"
timeout_secs = 10

[git]
protocol = "ssh"

[release_notes]
output = "{repo}/notes/{target}.md"
label_order = ["Core", "Build"]
highlight_label = "important"

[[release_notes.sections]]
title = "Everything"
labels = [[]]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: ToolsConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.gitlab.token_env, "MY_GL_TOKEN");
        assert_eq!(config.gitlab.timeout_secs, 10);
        assert_eq!(config.git.protocol, Protocol::Ssh);
        assert_eq!(config.release_notes.sections.len(), 1);
        assert_eq!(config.release_notes.sections[0].labels, vec![Vec::<String>::new()]);
        assert_eq!(config.release_notes.highlight_label, "important");
    }

    #[test]
    fn test_gitlab_host() {
        let config: ToolsConfig = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.gitlab.host(), "gitlab.example.org");
        assert_eq!(GitLabConfig::default().host(), "gitlab.cern.ch");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = ToolsConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.release_notes.output, "{repo}/notes/{target}.md");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ToolsConfig::load_from_file(&path),
            Err(ConfigError::FileNotFound(_))
        ));
        let config = ToolsConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.gitlab.url, "https://gitlab.cern.ch");
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[gitlab\nurl = ").unwrap();
        assert!(matches!(
            ToolsConfig::load_or_default(Some(&path)),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = ToolsConfig::default();
        config.gitlab.url = "gitlab.cern.ch".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "gitlab.url"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("LBDEVTOOLS_TEST_TOKEN", "glpat-abc");
        let mut config = ToolsConfig::default();
        config.gitlab.token_env = "LBDEVTOOLS_TEST_TOKEN".into();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.gitlab.token.as_deref(), Some("glpat-abc"));
        std::env::remove_var("LBDEVTOOLS_TEST_TOKEN");

        config.gitlab.token_env = "LBDEVTOOLS_TEST_TOKEN_UNSET".into();
        config.resolve_env_vars().unwrap();
        assert!(config.gitlab.token.is_none());
    }

    #[test]
    fn test_defaults() {
        let config: ToolsConfig = toml::from_str("").unwrap();
        assert_eq!(config.gitlab.token_env, "GITLAB_TOKEN");
        assert_eq!(config.git.protocol, Protocol::Krb5);
        assert_eq!(config.release_notes.output, "{repo}/ReleaseNotes/{target}.md");
        assert_eq!(config.release_notes.sections.last().unwrap().title, "Other");
        assert!(config.validate().is_ok());
    }
}
