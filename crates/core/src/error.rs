use thiserror::Error;

/// Structural validation failures of core types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Empty chain identifier")]
    EmptyChain,

    #[error("Invalid chain identifier: {0}")]
    InvalidChain(String),

    #[error("Session block height must be greater than zero")]
    InvalidSessionHeight,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Unsupported token version: {0}")]
    UnsupportedTokenVersion(String),

    #[error("Invalid application signature on token")]
    InvalidApplicationSignature,

    #[error("Invalid client signature on proof")]
    InvalidClientSignature,

    #[error("Relay payload is empty")]
    EmptyPayload,

    #[error("Request hash does not match relay payload")]
    RequestHashMismatch,
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_chain() {
        let err = CoreError::InvalidChain("eth".to_string());
        assert_eq!(err.to_string(), "Invalid chain identifier: eth");
    }

    #[test]
    fn test_error_display_token_version() {
        let err = CoreError::UnsupportedTokenVersion("9.9.9".to_string());
        assert_eq!(err.to_string(), "Unsupported token version: 9.9.9");
    }

    #[test]
    fn test_error_display_request_hash() {
        let err = CoreError::RequestHashMismatch;
        assert_eq!(err.to_string(), "Request hash does not match relay payload");
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(CoreError::EmptyChain);
        assert!(result.is_err());
    }
}
