//! Configuration management for lumen.
//!
//! Loads configuration from ${LUMEN_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::math::{DEFAULT_DISPLAY_DEMOTE_MAX_LEN, DEFAULT_MERGE_MAX_ITERATIONS};

/// Math pipeline tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MathConfig {
    /// Wrap bare LaTeX-looking expressions in `$…$`.
    pub auto_detect: bool,
    /// Ceiling for adjacent-span merge rounds.
    pub merge_max_iterations: usize,
    /// One-line `$$…$$` spans shorter than this become inline.
    pub display_demote_max_len: usize,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            merge_max_iterations: DEFAULT_MERGE_MAX_ITERATIONS,
            display_demote_max_len: DEFAULT_DISPLAY_DEMOTE_MAX_LEN,
        }
    }
}

/// Code block affordances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    /// How long the "copied" label stays before reverting.
    pub copy_revert_ms: u64,
    /// Languages that get a preview button.
    pub preview_languages: Vec<String>,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            copy_revert_ms: 2000,
            preview_languages: vec!["html".to_string()],
        }
    }
}

impl CodeConfig {
    pub fn copy_revert(&self) -> Duration {
        Duration::from_millis(self.copy_revert_ms)
    }

    /// Case-insensitive membership check against `preview_languages`.
    pub fn is_previewable(&self, language: &str) -> bool {
        let language = language.trim();
        !language.is_empty()
            && self
                .preview_languages
                .iter()
                .any(|l| l.trim().eq_ignore_ascii_case(language))
    }
}

/// User-facing strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    /// Header of the first reasoning block; later ones get " (n)".
    pub reasoning: String,
    pub copy: String,
    pub copied: String,
    pub preview: String,
    /// Shown when a message has neither reasoning nor content.
    pub no_output: String,
    /// Prefix for error surfaces.
    pub error_prefix: String,
    /// Step header prefix while an agent is streaming.
    pub step_running: String,
    /// Step header prefix once the step has finalized.
    pub step_done: String,
    /// Step header prefix for a step cut short by a run error.
    pub step_failed: String,
    /// Status line after a run completes.
    pub run_complete: String,
    /// Status line after a failed run.
    pub run_failed: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            reasoning: "Model reasoning".to_string(),
            copy: "Copy".to_string(),
            copied: "Copied!".to_string(),
            preview: "Preview".to_string(),
            no_output: "(No text output)".to_string(),
            error_prefix: "Error".to_string(),
            step_running: "Agent running:".to_string(),
            step_done: "✓".to_string(),
            step_failed: "✗".to_string(),
            run_complete: "Run complete.".to_string(),
            run_failed: "An error occurred.".to_string(),
        }
    }
}

impl Labels {
    /// Header for the reasoning block at `index` (0-based).
    pub fn reasoning_header(&self, index: usize) -> String {
        if index == 0 {
            self.reasoning.clone()
        } else {
            format!("{} ({})", self.reasoning, index + 1)
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub math: MathConfig,
    pub code: CodeConfig,
    pub labels: Labels,
}

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time. Regenerate it with
/// `cargo xtask update-default-config` after changing a default.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Overlays `source` onto `target`, keeping target's comments and layout.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(arr) => {
                target[key] = Item::ArrayOfTables(arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for lumen configuration.
    //!
    //! LUMEN_HOME resolution order:
    //! 1. LUMEN_HOME environment variable (if set)
    //! 2. ~/.config/lumen (default)

    use std::path::PathBuf;

    use anyhow::{Context, Result};

    /// Returns the lumen home directory.
    pub fn lumen_home() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("LUMEN_HOME") {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("lumen"))
            .context("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(lumen_home()?.join("config.toml"))
    }
}

impl Config {
    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path()?)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults, laid over the
    /// commented template so the comments survive.
    pub fn generate() -> Result<String> {
        use toml_edit::DocumentMut;

        let generated_toml = toml::to_string(&Config::default())
            .context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        merge_items(doc.as_table_mut(), generated_doc.as_table());

        Ok(doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Temp file + rename so a crash never leaves a half-written config.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.math.display_demote_max_len, 100);
        assert_eq!(config.math.merge_max_iterations, 20);
        assert_eq!(config.code.copy_revert_ms, 2000);
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "[math]\nauto_detect = false\n\n[labels]\ncopy = \"Copier\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert!(!config.math.auto_detect);
        assert_eq!(config.math.merge_max_iterations, 20);
        assert_eq!(config.labels.copy, "Copier");
        assert_eq!(config.labels.copied, "Copied!");
        assert_eq!(config.code.preview_languages, ["html"]);
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[math\n").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        assert!(config_path.exists());
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("display_demote_max_len = 100"));
        assert!(contents.contains("# "));
        let loaded = Config::load_from(&config_path).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "").unwrap();

        let result = Config::init(&config_path);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "");
    }

    #[test]
    fn test_generate_matches_defaults_and_keeps_comments() {
        let generated = Config::generate().unwrap();
        assert!(generated.contains("# "));
        let parsed: Config = toml::from_str(&generated).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_reasoning_header_suffix() {
        let labels = Labels::default();
        assert_eq!(labels.reasoning_header(0), "Model reasoning");
        assert_eq!(labels.reasoning_header(1), "Model reasoning (2)");
        assert_eq!(labels.reasoning_header(2), "Model reasoning (3)");
    }

    #[test]
    fn test_is_previewable_case_insensitive() {
        let code = CodeConfig::default();
        assert!(code.is_previewable("html"));
        assert!(code.is_previewable("HTML"));
        assert!(!code.is_previewable("rust"));
        assert!(!code.is_previewable(""));
    }

    #[test]
    fn test_copy_revert_duration() {
        assert_eq!(
            CodeConfig::default().copy_revert(),
            Duration::from_millis(2000)
        );
    }
}
