//! PIN verification
//!
//! PINs are stored as argon2 PHC strings. Verification is CPU-bound and
//! deliberately slow, so it runs on the blocking pool and always happens
//! before the ledger opens its database transaction.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core_types::BankId;
use crate::error::TransferError;
use crate::models::PinHash;
use crate::store::CredentialStore;

/// PIN as typed by the user. Never logged.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Pin(String);

impl Pin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(<redacted>)")
    }
}

/// Where the sender's PIN is checked: their own IPA or card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuthContext {
    Ipa { address: String },
    Card { bank_id: BankId, card_number: String },
}

impl fmt::Display for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthContext::Ipa { address } => write!(f, "ipa:{}", address),
            AuthContext::Card { bank_id, .. } => write!(f, "card:{}", bank_id),
        }
    }
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(())` when the PIN matches, `InvalidPin` otherwise
    async fn verify(&self, ctx: &AuthContext, pin: &Pin) -> Result<(), TransferError>;
}

/// Verifies against the hashes held by a [`CredentialStore`]
pub struct HashedPinVerifier {
    store: Arc<dyn CredentialStore>,
}

impl HashedPinVerifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialVerifier for HashedPinVerifier {
    async fn verify(&self, ctx: &AuthContext, pin: &Pin) -> Result<(), TransferError> {
        if pin.is_blank() {
            return Err(TransferError::InvalidPin);
        }

        let Some(hash) = self.store.pin_hash(ctx).await? else {
            debug!(auth = %ctx, "No PIN hash on record");
            return Err(TransferError::InvalidPin);
        };

        let pin = pin.clone();
        let matched = tokio::task::spawn_blocking(move || verify_pin(&pin, &hash))
            .await
            .map_err(|e| TransferError::System(format!("PIN verification task failed: {}", e)))??;

        if matched {
            Ok(())
        } else {
            debug!(auth = %ctx, "PIN mismatch");
            Err(TransferError::InvalidPin)
        }
    }
}

/// Blocking comparison of a PIN against a PHC hash
pub fn verify_pin(pin: &Pin, hash: &PinHash) -> Result<bool, TransferError> {
    let parsed = PasswordHash::new(hash.as_str()).map_err(|e| {
        warn!(error = %e, "Stored PIN hash is malformed");
        TransferError::System("stored PIN hash is malformed".into())
    })?;
    // parameters come from the PHC string, not from this instance
    Ok(Argon2::default()
        .verify_password(pin.expose().as_bytes(), &parsed)
        .is_ok())
}

/// Produces PIN hashes for provisioning and tests
#[derive(Clone)]
pub struct PinHasher {
    argon2: Argon2<'static>,
}

impl Default for PinHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl PinHasher {
    /// Custom cost: memory in KiB, iterations, lanes
    pub fn with_cost(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, TransferError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| TransferError::Validation(format!("argon2 params: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, pin: &Pin) -> Result<PinHash, TransferError> {
        if pin.is_blank() {
            return Err(TransferError::Validation("PIN cannot be empty".into()));
        }
        let salt = SaltString::generate(&mut OsRng);
        let phc = self
            .argon2
            .hash_password(pin.expose().as_bytes(), &salt)
            .map_err(|e| TransferError::System(format!("hashing failed: {}", e)))?
            .to_string();
        Ok(PinHash::new(phc))
    }
}

/// Hash with the default argon2id cost
pub fn hash_pin(pin: &Pin) -> Result<PinHash, TransferError> {
    PinHasher::default().hash(pin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::AccountKey;
    use crate::money::Amount;
    use crate::store::memory::MemoryStore;

    fn cheap() -> PinHasher {
        PinHasher::with_cost(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        assert_eq!(format!("{:?}", Pin::new("1234")), "Pin(<redacted>)");
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = cheap().hash(&Pin::new("1234")).unwrap();
        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(verify_pin(&Pin::new("1234"), &hash).unwrap());
        assert!(!verify_pin(&Pin::new("4321"), &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_system_error() {
        let err = verify_pin(&Pin::new("1234"), &PinHash::new("plaintext")).unwrap_err();
        assert_eq!(err.code(), "SYSTEM_ERROR");
    }

    #[tokio::test]
    async fn test_verifier_against_store() {
        let store = Arc::new(MemoryStore::new());
        let user = store.add_user(1, "Amr", "Saleh", None).await;
        let key = AccountKey::new(1, "1001");
        store
            .add_account(key.clone(), user.bank_user, "EG001", Amount::ZERO)
            .await;
        store
            .add_ipa("amr@bank", key, 1, cheap().hash(&Pin::new("1234")).unwrap())
            .await;

        let verifier = HashedPinVerifier::new(store);
        let ctx = AuthContext::Ipa {
            address: "amr@bank".into(),
        };
        assert!(verifier.verify(&ctx, &Pin::new("1234")).await.is_ok());
        assert_eq!(
            verifier.verify(&ctx, &Pin::new("0000")).await,
            Err(TransferError::InvalidPin)
        );
        assert_eq!(
            verifier.verify(&ctx, &Pin::new("")).await,
            Err(TransferError::InvalidPin)
        );

        let unknown = AuthContext::Ipa {
            address: "ghost@bank".into(),
        };
        assert_eq!(
            verifier.verify(&unknown, &Pin::new("1234")).await,
            Err(TransferError::InvalidPin)
        );
    }
}
