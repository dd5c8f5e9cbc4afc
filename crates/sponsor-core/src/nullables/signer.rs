//! Nullable signers and wallet resolver.

use std::sync::Mutex;

use async_trait::async_trait;
use chain_sol::{codec, Address, Message, Signature};
use ed25519_dalek::{Signer as _, SigningKey};

use super::lock;
use crate::directory::{SponsorLookup, WalletResolver, WalletStatus};
use crate::error::{SignerError, TransferError};
use crate::signer::{ExternalSigner, SignRequest, SignResponse};

/// How a [`NullSigner`] answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerBehavior {
    /// Sign with its own key.
    Sign,
    /// The user dismissed the prompt.
    Cancel,
    /// Report an error status.
    Fail(String),
    /// Never answer.
    Hang,
    /// Sign with an unrelated key.
    WrongKey,
    /// Report success without a signature.
    MissingSignature,
    /// Report success with a signature that is not hex.
    Garbage,
    /// Fail to deliver the request at all.
    Unreachable,
}

/// An external signer backed by a deterministic in-memory Ed25519 key.
pub struct NullSigner {
    key: SigningKey,
    behavior: Mutex<SignerBehavior>,
    requests: Mutex<Vec<SignRequest>>,
}

impl NullSigner {
    /// A signer whose key is derived from `seed`. Equal seeds give equal keys.
    pub fn new(seed: u8) -> Self {
        Self {
            key: SigningKey::from_bytes(&[seed; 32]),
            behavior: Mutex::new(SignerBehavior::Sign),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(self, behavior: SignerBehavior) -> Self {
        *lock(&self.behavior) = behavior;
        self
    }

    pub fn set_behavior(&self, behavior: SignerBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn address(&self) -> Address {
        Address::new(self.key.verifying_key().to_bytes())
    }

    /// Sign arbitrary bytes directly, bypassing the request flow.
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.key.sign(message).into()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<SignRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ExternalSigner for NullSigner {
    async fn sign(&self, request: SignRequest) -> Result<SignResponse, SignerError> {
        lock(&self.requests).push(request.clone());
        let behavior = lock(&self.behavior).clone();

        // A real signer refuses bytes it cannot parse as a message.
        let message = match codec::decode(&request.message_hex) {
            Ok(bytes) if Message::deserialize(&bytes).is_ok() => bytes,
            Ok(_) => return Ok(SignResponse::error("not a transaction message")),
            Err(e) => return Ok(SignResponse::error(e.to_string())),
        };

        match behavior {
            SignerBehavior::Sign => Ok(SignResponse::success(
                self.sign_message(&message).to_hex(),
            )),
            SignerBehavior::Cancel => Ok(SignResponse::cancelled()),
            SignerBehavior::Fail(reason) => Ok(SignResponse::error(reason)),
            SignerBehavior::Hang => std::future::pending().await,
            SignerBehavior::WrongKey => {
                let other = SigningKey::from_bytes(&[0xEE; 32]);
                let signature: Signature = other.sign(&message).into();
                Ok(SignResponse::success(signature.to_hex()))
            }
            SignerBehavior::MissingSignature => Ok(SignResponse {
                signature: None,
                ..SignResponse::success(String::new())
            }),
            SignerBehavior::Garbage => Ok(SignResponse::success("0xnot-hex".into())),
            SignerBehavior::Unreachable => {
                Err(SignerError::Transport("null signer: connection refused".into()))
            }
        }
    }
}

/// Identity service double.
pub struct NullWallet {
    status: WalletStatus,
}

impl NullWallet {
    pub fn connected(address: Address) -> Self {
        Self {
            status: WalletStatus::Connected(address),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: WalletStatus::Cancelled,
        }
    }
}

#[async_trait]
impl WalletResolver for NullWallet {
    async fn get_wallet(&self) -> Result<WalletStatus, TransferError> {
        Ok(self.status)
    }
}

#[async_trait]
impl SponsorLookup for NullWallet {
    async fn sponsor_address(&self) -> Result<Address, TransferError> {
        match self.status {
            WalletStatus::Connected(address) => Ok(address),
            WalletStatus::Cancelled => Err(TransferError::ParticipantUnavailable(
                "null sponsor lookup has no address".into(),
            )),
        }
    }
}
