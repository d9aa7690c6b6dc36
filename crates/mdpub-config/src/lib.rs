use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "mdpub.toml";

/// Prefix of the environment variables that override file values.
pub const ENV_PREFIX: &str = "MDPUB_";

const OUTPUT_FORMATS: &[&str] = &["md", "markdown", "mdx"];
const PARSER_PRESETS: &[&str] = &["commonmark", "gfm-like", "gfm", "default"];
const DEMOTE_STYLES: &[&str] = &["heading", "bold"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value `{value}` for {field} (expected {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Deepest heading level that still opens a section.
    pub max_nesting: u8,
    pub output_format: String,
    pub parser_preset: String,
    /// How headings below `max_nesting` are rendered: `heading` or `bold`.
    pub demote_style: String,
    pub output_dir: PathBuf,
    /// Root of the file-backed version store.
    pub store_dir: PathBuf,
    /// Worker threads for batch builds, 0 for one per core.
    pub workers: usize,
    pub diff_context: usize,
    pub repository_timeout_ms: u64,
    pub reconcile_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_nesting: 6,
            output_format: "mdx".to_string(),
            parser_preset: "gfm-like".to_string(),
            demote_style: "heading".to_string(),
            output_dir: PathBuf::from("dist"),
            store_dir: PathBuf::from(".mdpub/store"),
            workers: 0,
            diff_context: 3,
            repository_timeout_ms: 5000,
            reconcile_retries: 3,
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.expand_paths();
        config.validate()?;
        Ok(Some(config))
    }

    /// Defaults, then `config_path` (when it exists), then `MDPUB_*`
    /// environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);
        let mut config = Self::load_from_path(&config_path)?.unwrap_or_default();

        config.apply_env(|name| std::env::var(name).ok())?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    /// Override fields from variables named `MDPUB_<FIELD>`, looked up
    /// through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |field: &str| lookup(&format!("{ENV_PREFIX}{}", field.to_uppercase()));

        if let Some(value) = var("max_nesting") {
            self.max_nesting = parse_number("max_nesting", &value)?;
        }
        if let Some(value) = var("output_format") {
            self.output_format = value;
        }
        if let Some(value) = var("parser_preset") {
            self.parser_preset = value;
        }
        if let Some(value) = var("demote_style") {
            self.demote_style = value;
        }
        if let Some(value) = var("output_dir") {
            self.output_dir = PathBuf::from(value);
        }
        if let Some(value) = var("store_dir") {
            self.store_dir = PathBuf::from(value);
        }
        if let Some(value) = var("workers") {
            self.workers = parse_number("workers", &value)?;
        }
        if let Some(value) = var("diff_context") {
            self.diff_context = parse_number("diff_context", &value)?;
        }
        if let Some(value) = var("repository_timeout_ms") {
            self.repository_timeout_ms = parse_number("repository_timeout_ms", &value)?;
        }
        if let Some(value) = var("reconcile_retries") {
            self.reconcile_retries = parse_number("reconcile_retries", &value)?;
        }
        Ok(())
    }

    /// Check the enumerated string fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_choice("output_format", &self.output_format, OUTPUT_FORMATS)?;
        check_choice("parser_preset", &self.parser_preset, PARSER_PRESETS)?;
        check_choice("demote_style", &self.demote_style, DEMOTE_STYLES)
    }

    fn expand_paths(&mut self) {
        if let Some(expanded) = Self::expand_path(&self.output_dir) {
            self.output_dir = expanded;
        }
        if let Some(expanded) = Self::expand_path(&self.store_dir) {
            self.store_dir = expanded;
        }
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        expected: "a non-negative integer".to_string(),
    })
}

fn check_choice(field: &'static str, value: &str, choices: &[&str]) -> Result<(), ConfigError> {
    if choices.contains(&value.to_ascii_lowercase().as_str()) {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        expected: format!("one of {}", choices.join(", ")),
    })
}
