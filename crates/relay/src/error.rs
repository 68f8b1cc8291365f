use relaycraft_core::{Address, CoreError, ExecutionError};
use relaycraft_evidence::EvidenceError;
use relaycraft_registry::RegistryError;
use relaycraft_session::SessionError;
use thiserror::Error;

/// Broad failure category, for callers that map errors to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is unacceptable
    Validation,
    /// A local dependency failed
    Infrastructure,
    /// A signature or key did not check out
    Crypto,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    Invalid(#[from] CoreError),

    #[error("No servicer identity for {0}")]
    UnknownServicer(Address),

    #[error("Servicer key in proof does not match this node")]
    ServicerKeyMismatch,

    #[error("Session height {height} is outside tolerance of latest session {latest}")]
    SessionHeightOutOfTolerance { height: u64, latest: u64 },

    #[error("Block height {0} is not the start of a session")]
    InvalidBlockHeight(u64),

    #[error("Blockchain {0} is not hosted by this node")]
    UnsupportedChain(String),

    #[error("Application not found")]
    AppNotFound,

    #[error("Application is jailed")]
    AppJailed,

    #[error("Application is not staked for chain {0}")]
    AppChainNotStaked(String),

    #[error("Servicer {0} is not in the session")]
    NotInSession(Address),

    #[error("Duplicate proof: entropy {0}")]
    DuplicateProof(u64),

    #[error("Evidence cap of {0} reached")]
    EvidenceCapExceeded(u64),

    #[error("Evidence is sealed")]
    EvidenceSealed,

    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("Servicer {0} has no stores")]
    NoStores(Address),

    #[error("Unknown query: {0}")]
    UnknownQuery(String),

    #[error("Failed to parse query params: {0}")]
    InvalidQuery(String),

    #[error("Failed to encode query result: {0}")]
    Encode(String),

    #[error("Hosted chain execution failed: {0}")]
    ExecutionFailed(#[from] ExecutionError),

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Evidence error: {0}")]
    Evidence(EvidenceError),
}

impl RelayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RelayError::Invalid(
                CoreError::InvalidApplicationSignature
                | CoreError::InvalidClientSignature
                | CoreError::InvalidPublicKey,
            )
            | RelayError::ServicerKeyMismatch => ErrorClass::Crypto,
            RelayError::Invalid(_)
            | RelayError::UnknownServicer(_)
            | RelayError::SessionHeightOutOfTolerance { .. }
            | RelayError::InvalidBlockHeight(_)
            | RelayError::UnsupportedChain(_)
            | RelayError::AppNotFound
            | RelayError::AppJailed
            | RelayError::AppChainNotStaked(_)
            | RelayError::NotInSession(_)
            | RelayError::DuplicateProof(_)
            | RelayError::EvidenceCapExceeded(_)
            | RelayError::EvidenceSealed
            | RelayError::InvalidChallenge(_)
            | RelayError::UnknownQuery(_)
            | RelayError::InvalidQuery(_) => ErrorClass::Validation,
            RelayError::Session(SessionError::InvalidHeader(_)) => ErrorClass::Validation,
            RelayError::NoStores(_)
            | RelayError::Encode(_)
            | RelayError::ExecutionFailed(_)
            | RelayError::Registry(_)
            | RelayError::Session(_)
            | RelayError::Evidence(_) => ErrorClass::Infrastructure,
        }
    }
}

impl From<EvidenceError> for RelayError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::DuplicateProof { entropy } => RelayError::DuplicateProof(entropy),
            EvidenceError::CapExceeded { cap } => RelayError::EvidenceCapExceeded(cap),
            EvidenceError::Sealed => RelayError::EvidenceSealed,
            other => RelayError::Evidence(other),
        }
    }
}

impl From<RegistryError> for RelayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(address) => RelayError::UnknownServicer(address),
            other => RelayError::Registry(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(RelayError::AppNotFound.class(), ErrorClass::Validation);
        assert_eq!(
            RelayError::Invalid(CoreError::InvalidClientSignature).class(),
            ErrorClass::Crypto
        );
        assert_eq!(
            RelayError::Invalid(CoreError::RequestHashMismatch).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            RelayError::ExecutionFailed(ExecutionError::Timeout).class(),
            ErrorClass::Infrastructure
        );
    }

    #[test]
    fn test_evidence_errors_map_to_relay_errors() {
        let err: RelayError = EvidenceError::DuplicateProof { entropy: 9 }.into();
        assert!(matches!(err, RelayError::DuplicateProof(9)));
        let err: RelayError = EvidenceError::CapExceeded { cap: 3 }.into();
        assert!(matches!(err, RelayError::EvidenceCapExceeded(3)));
    }

    #[test]
    fn test_registry_not_found_is_unknown_servicer() {
        let err: RelayError = RegistryError::NotFound(Address([1u8; 20])).into();
        assert!(matches!(err, RelayError::UnknownServicer(_)));
        assert_eq!(err.class(), ErrorClass::Validation);
    }
}
