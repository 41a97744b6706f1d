use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("remote service error: {0}")]
    RemoteService(String),

    #[error("list {list} update referenced out-of-range removal index {index}")]
    Desync { list: String, index: usize },

    #[error("threat database not initialized, no update cycle has completed yet")]
    NotReady,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteService(err.to_string())
    }
}
