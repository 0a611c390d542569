use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unsupported ACL: {0}")]
    UnsupportedAcl(String),

    #[error("cannot put object to root: {0}")]
    ObjectAtRoot(String),

    #[error("empty blob path: {0}")]
    EmptyBlobPath(String),

    #[error("invalid byte range: {0}")]
    InvalidRange(String),
}
