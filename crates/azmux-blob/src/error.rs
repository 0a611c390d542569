use azmux_arm::ArmError;
use azmux_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error(transparent)]
    Arm(#[from] ArmError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("blob or container not found")]
    NotFound,

    #[error("storage error {status} {code}: {message}")]
    Storage {
        status:  u16,
        code:    String,
        message: String,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid storage account key: {0}")]
    InvalidKey(String),

    #[error("unsupported method for signed url: {0}")]
    UnsupportedMethod(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid VHD: {0}")]
    InvalidVhd(String),

    #[error("malformed XML response: {0}")]
    Xml(String),

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error("no free name for {0}")]
    Duplicate(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound | BlobError::Arm(ArmError::NotFound))
    }
}
