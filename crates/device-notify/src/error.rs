use thiserror::Error;

pub type Result<T, E = BridgeError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum BridgeError {
    #[error("backend rejected registration (returned {0})")]
    RegistrationFailed(i64),
    #[error("unrecognized notification code: {0}")]
    MalformedEvent(u32),
}
