use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmaError {
    #[error("invalid error kind: {0}")]
    InvalidErrorKind(String),

    #[error("invalid role '{0}': expected athlete, coach, organization or parent")]
    InvalidRole(String),

    #[error("invalid sort order: {0}")]
    InvalidSort(String),

    #[error("invalid search filters: {0}")]
    InvalidFilters(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, AmaError>;
