use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("ws bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("listener setup failed: {0}")]
    Listener(#[from] std::io::Error),
}
