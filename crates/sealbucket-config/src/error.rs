use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error("Unknown provider '{0}' (expected 'aws' or 'memory')")]
    UnknownProvider(String),

    #[error("Invalid stack name '{0}': use letters, digits, '-' or '_'")]
    InvalidStackName(String),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
