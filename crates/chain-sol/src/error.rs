use thiserror::Error;

/// Solana primitive errors: encoding, transaction assembly and signature slots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("signature does not verify for signer {0}")]
    SignatureMismatch(String),

    #[error("signer {0} already has a signature attached")]
    DuplicateSignature(String),

    #[error("{0} is not a required signer of this transaction")]
    UnexpectedSigner(String),

    #[error("missing signatures for: {}", .0.join(", "))]
    MissingSignatures(Vec<String>),
}
