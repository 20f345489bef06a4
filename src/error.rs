use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no valid http(s) target URL found in {}", .0.display())]
    NoTargets(PathBuf),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("QUIC setup failed: {0}")]
    Quic(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
