//! Error taxonomy for the pipeline seams

use thiserror::Error;

/// Errors surfaced by the snapshot writer, the harvester and the stores.
///
/// Unparseable money and missing FX rates are not errors; they travel as
/// `None` values.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is absent; raised before any work starts.
    #[error("missing required configuration: {0}")]
    ConfigurationMissing(&'static str),

    /// A snapshot run failed and was rolled back as a whole.
    #[error("snapshot rolled back while processing table `{table}`: {source}")]
    Transaction {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unsupported category: {0}")]
    UnsupportedCategory(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cursor store error: {0}")]
    Cursor(#[from] std::io::Error),
}

impl Error {
    pub fn transaction(table: impl Into<String>, source: sqlx::Error) -> Self {
        Error::Transaction {
            table: table.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
