use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Missing block: {0}")]
    MissingBlock(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Listing overflow: more than {cap} entries under {path}")]
    ListingOverflow { path: String, cap: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
