//! Configuration system (layered: code > env > config file > defaults).

use std::path::Path;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, ThoughtlineError};
use crate::normalize::Dialect;

/// Delimiters used to split reasoning out of plain answer text.
///
/// Immutable for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct DelimiterConfig {
    #[builder(into)]
    pub opening_tag: String,
    #[builder(into)]
    pub closing_tag: String,
    /// Text right after the closing tag that is discarded (e.g. a blank line).
    #[builder(into, default)]
    #[serde(default)]
    pub separator: String,
    #[builder(default = true)]
    #[serde(default = "default_enabled", alias = "enable_reasoning")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for DelimiterConfig {
    fn default() -> Self {
        TagPreset::Think.config()
    }
}

impl DelimiterConfig {
    /// A configuration that never splits anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Reject configurations the extractor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.opening_tag.is_empty() {
            return Err(ThoughtlineError::Configuration(
                "opening_tag must not be empty when reasoning extraction is enabled".into(),
            ));
        }
        if self.closing_tag.is_empty() {
            return Err(ThoughtlineError::Configuration(
                "closing_tag must not be empty when reasoning extraction is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Delimiter pairs commonly emitted by reasoning models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TagPreset {
    /// `<think>` / `</think>` (DeepSeek-R1, QwQ, Qwen3).
    Think,
    /// `<thinking>` / `</thinking>`.
    Thinking,
    /// `<thought>` / `</thought>`.
    Thought,
    /// `<reasoning>` / `</reasoning>`.
    Reasoning,
    /// `###Thinking` / `###Response` section headers.
    ResponseHeader,
}

impl TagPreset {
    pub fn config(self) -> DelimiterConfig {
        let (opening, closing) = match self {
            Self::Think => ("<think>", "</think>"),
            Self::Thinking => ("<thinking>", "</thinking>"),
            Self::Thought => ("<thought>", "</thought>"),
            Self::Reasoning => ("<reasoning>", "</reasoning>"),
            Self::ResponseHeader => ("###Thinking", "###Response"),
        };
        DelimiterConfig::builder()
            .opening_tag(opening)
            .closing_tag(closing)
            .build()
    }
}

/// Everything a pipeline needs at construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub delimiters: DelimiterConfig,
}

/// On-disk shape: either a preset or explicit tags (explicit fields win).
#[derive(Debug, Default, Deserialize)]
struct RawPipelineConfig {
    #[serde(default)]
    dialect: Option<Dialect>,
    #[serde(default)]
    preset: Option<TagPreset>,
    #[serde(default)]
    delimiters: RawDelimiters,
}

#[derive(Debug, Default, Deserialize)]
struct RawDelimiters {
    opening_tag: Option<String>,
    closing_tag: Option<String>,
    separator: Option<String>,
    #[serde(alias = "enable_reasoning")]
    enabled: Option<bool>,
}

const ENV_DIALECT: &str = "THOUGHTLINE_DIALECT";
const ENV_PRESET: &str = "THOUGHTLINE_PRESET";
const ENV_OPENING_TAG: &str = "THOUGHTLINE_OPENING_TAG";
const ENV_CLOSING_TAG: &str = "THOUGHTLINE_CLOSING_TAG";
const ENV_SEPARATOR: &str = "THOUGHTLINE_SEPARATOR";
const ENV_ENABLE_REASONING: &str = "THOUGHTLINE_ENABLE_REASONING";

impl PipelineConfig {
    /// Parse a TOML document.
    ///
    /// ```
    /// use thoughtline::config::PipelineConfig;
    ///
    /// let config = PipelineConfig::from_toml_str(r#"
    ///     dialect = "anthropic"
    ///     preset = "thinking"
    ///
    ///     [delimiters]
    ///     separator = "\n\n"
    /// "#).unwrap();
    /// assert_eq!(config.delimiters.opening_tag, "<thinking>");
    /// assert_eq!(config.delimiters.separator, "\n\n");
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawPipelineConfig = toml::from_str(raw)?;
        let mut config = Self {
            dialect: raw.dialect.unwrap_or_default(),
            delimiters: raw.preset.map(TagPreset::config).unwrap_or_default(),
        };
        config.apply_delimiters(raw.delimiters);
        config.delimiters.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Load from environment variables (`THOUGHTLINE_*`), reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup on top of this config.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dialect) = lookup(ENV_DIALECT) {
            self.dialect = dialect.parse().map_err(|_| {
                ThoughtlineError::Configuration(format!("unknown dialect '{dialect}'"))
            })?;
        }
        if let Some(preset) = lookup(ENV_PRESET) {
            let preset: TagPreset = preset.parse().map_err(|_| {
                ThoughtlineError::Configuration(format!("unknown tag preset '{preset}'"))
            })?;
            let enabled = self.delimiters.enabled;
            self.delimiters = DelimiterConfig {
                enabled,
                ..preset.config()
            };
        }
        let enabled = match lookup(ENV_ENABLE_REASONING) {
            Some(value) => Some(parse_bool(&value).ok_or_else(|| {
                ThoughtlineError::Configuration(format!(
                    "{ENV_ENABLE_REASONING} must be a boolean, got '{value}'"
                ))
            })?),
            None => None,
        };
        self.apply_delimiters(RawDelimiters {
            opening_tag: lookup(ENV_OPENING_TAG),
            closing_tag: lookup(ENV_CLOSING_TAG),
            separator: lookup(ENV_SEPARATOR),
            enabled,
        });
        self.delimiters.validate()?;
        Ok(self)
    }

    fn apply_delimiters(&mut self, raw: RawDelimiters) {
        if let Some(tag) = raw.opening_tag {
            self.delimiters.opening_tag = tag;
        }
        if let Some(tag) = raw.closing_tag {
            self.delimiters.closing_tag = tag;
        }
        if let Some(separator) = raw.separator {
            self.delimiters.separator = separator;
        }
        if let Some(enabled) = raw.enabled {
            self.delimiters.enabled = enabled;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
