use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("network error fetching remote '{remote}': {message}")]
    Network { remote: String, message: String },
    #[error("corrupted catalog for remote '{remote}': {reason}")]
    Corrupted { remote: String, reason: String },
    #[error("no such remote: {0}")]
    NoSuchRemote(String),
}
