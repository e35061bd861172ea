use std::path::{Path, PathBuf};

use config::{Config, ConfigError};
use serde::Deserialize;

use crate::error::{Error, Result};

// Choice markers run 1）..3） and every record carries exactly this many.
const CHOICE_SLOTS: usize = 3;

/// Pipeline knobs. Loaded from `qbank.toml` (optional) and `QBANK_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub min_choices: usize,
    pub target_choices: usize,
    pub min_statement_chars: usize,
    pub preview_chars: usize,
    pub rules_path: Option<PathBuf>,
    pub ranks_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            min_choices: 2,
            target_choices: 3,
            min_statement_chars: 10,
            preview_chars: 100,
            rules_path: None,
            ranks_path: None,
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("qbank").required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(source)
            .add_source(config::Environment::with_prefix("QBANK").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.check()
    }

    fn check(self) -> Result<Self> {
        let invalid = |msg: String| Err(Error::Config(ConfigError::Message(msg)));
        if self.target_choices != CHOICE_SLOTS {
            return invalid(format!(
                "target_choices must be {}, got {}",
                CHOICE_SLOTS, self.target_choices
            ));
        }
        if self.min_choices == 0 || self.min_choices > self.target_choices {
            return invalid(format!(
                "min_choices must be between 1 and {}, got {}",
                self.target_choices, self.min_choices
            ));
        }
        if self.preview_chars == 0 {
            return invalid("preview_chars must be positive".to_string());
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dataset_schema() {
        let s = Settings::default();
        assert_eq!(s.min_choices, 2);
        assert_eq!(s.target_choices, 3);
        assert_eq!(s.min_statement_chars, 10);
        assert_eq!(s.preview_chars, 100);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qbank.toml");
        std::fs::write(&path, "min_statement_chars = 12\nrules_path = \"rules.json\"\n").unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.min_statement_chars, 12);
        assert_eq!(s.target_choices, 3);
        assert_eq!(s.rules_path.as_deref(), Some(Path::new("rules.json")));
    }

    #[test]
    fn out_of_range_counts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qbank.toml");
        for body in [
            "target_choices = 4\n",
            "target_choices = 2\n",
            "min_choices = 4\n",
            "min_choices = 0\n",
            "preview_chars = 0\n",
        ] {
            std::fs::write(&path, body).unwrap();
            let err = Settings::load(Some(&path)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{}: {}", body.trim(), err);
        }

        std::fs::write(&path, "min_choices = 3\n").unwrap();
        assert_eq!(Settings::load(Some(&path)).unwrap().min_choices, 3);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
