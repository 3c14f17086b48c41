//! Session configuration.
//!
//! Values come from an optional JSON file (`HANGPY_CONFIG` names it for the
//! binary) and are then overridden by environment variables:
//!
//! - `HANGPY_KEYWORDS`: keyword-mapping source, a file path or an
//!   `http(s)://` URL. Unset means the built-in table.
//! - `HANGPY_LANG`: transcript message catalog, `ko` (default) or `en`.

use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result, keywords::KeywordSource};

pub const ENV_CONFIG: &str = "HANGPY_CONFIG";
pub const ENV_KEYWORDS: &str = "HANGPY_KEYWORDS";
pub const ENV_LANG: &str = "HANGPY_LANG";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Keyword-mapping source; `None` uses the built-in table.
    pub keywords: Option<String>,
    pub lang: Lang,
    /// Replaces the `lang` catalog when set.
    pub messages: Option<Messages>,
    /// Call names made awaitable by the rewriter: the localized alias, then the canonical name.
    pub input_names: Vec<String>,
    pub entry_point: String,
    /// Guest name of the host-bound line request function.
    pub bridge_function: String,
    pub indent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: None,
            lang: Lang::Ko,
            messages: None,
            input_names: vec!["입력".to_string(), "input".to_string()],
            entry_point: "__hangpy_main__".to_string(),
            bridge_function: "__hangpy_request_line__".to_string(),
            indent: "  ".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Ko,
    En,
}

impl std::str::FromStr for Lang {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ko" | "kr" | "korean" => Ok(Self::Ko),
            "en" | "english" => Ok(Self::En),
            other => Err(Error::Config(format!("unknown language: {other}"))),
        }
    }
}

/// Transcript annotations.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Messages {
    pub run_separator: String,
    pub execution_error: String,
    pub not_ready: String,
    pub stderr_marker: String,
    pub boot_error: String,
    pub saved: String,
    pub loaded: String,
}

impl Messages {
    #[must_use]
    pub fn korean() -> Self {
        Self {
            run_separator: "\n----- 실행 -----".to_string(),
            execution_error: "[실행 오류]".to_string(),
            not_ready: "[실행 불가] 아직 준비되지 않았습니다".to_string(),
            stderr_marker: "[에러] ".to_string(),
            boot_error: "[초기화 오류]".to_string(),
            saved: "[저장됨]".to_string(),
            loaded: "[불러옴]".to_string(),
        }
    }

    #[must_use]
    pub fn english() -> Self {
        Self {
            run_separator: "\n----- run -----".to_string(),
            execution_error: "[execution error]".to_string(),
            not_ready: "[not ready] the runtime is still booting".to_string(),
            stderr_marker: "[stderr] ".to_string(),
            boot_error: "[boot error]".to_string(),
            saved: "[saved]".to_string(),
            loaded: "[loaded]".to_string(),
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::korean()
    }
}

impl Config {
    /// Parse a JSON config document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`Error::Config`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, then apply environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment override is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_json(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup, normally `std::env::var`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `HANGPY_LANG` names an unknown catalog.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(keywords) = lookup(ENV_KEYWORDS).filter(|v| !v.trim().is_empty()) {
            self.keywords = Some(keywords);
        }
        if let Some(lang) = lookup(ENV_LANG).filter(|v| !v.trim().is_empty()) {
            self.lang = lang.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.input_names.is_empty() {
            return Err(Error::Config("input_names must not be empty".to_string()));
        }
        if self.entry_point.is_empty() || self.bridge_function.is_empty() {
            return Err(Error::Config(
                "entry_point and bridge_function must be set".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn messages(&self) -> Messages {
        self.messages.clone().unwrap_or_else(|| match self.lang {
            Lang::Ko => Messages::korean(),
            Lang::En => Messages::english(),
        })
    }

    /// # Errors
    /// Returns [`Error::Config`] if the configured source is not a valid path or URL.
    pub fn keyword_source(&self) -> Result<KeywordSource> {
        self.keywords
            .as_deref()
            .map_or(Ok(KeywordSource::Builtin), KeywordSource::parse)
    }
}
