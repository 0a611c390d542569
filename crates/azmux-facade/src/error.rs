use azmux_arm::ArmError;
use azmux_blob::BlobError;
use azmux_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Arm(#[from] ArmError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl FacadeError {
    pub fn is_not_found(&self) -> bool {
        match self {
            FacadeError::Arm(e) => e.is_not_found(),
            FacadeError::Blob(e) => e.is_not_found(),
            _ => false,
        }
    }
}
