use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule pattern {pattern:?} does not compile: {source}")]
    Rule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {0:?} needs a pattern")]
    MissingPattern(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("{0} table is empty")]
    EmptyTable(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read a whole file as UTF-8, tagging failures with the path.
pub fn read_file(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a JSON document from `path`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: serde::Serialize + ?Sized>(path: &std::path::Path, value: &T) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, body + "\n").map_err(io_err)
}
