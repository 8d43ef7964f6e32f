//! Payment signing
//!
//! The signer seam is asynchronous and may suspend on human-speed external
//! interaction (a hardware wallet, a browser prompt). [`LocalSigner`] is
//! the in-process implementation over a raw secp256k1 key; callers that
//! need out-of-process signing implement [`PaymentSigner`] themselves.

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use paylane_types::{PaylaneError, Result};
use rand::RngCore;

use crate::eip712::{address_from_verifying_key, authorization_digest};
use crate::types::{
    chain_id_from_network, ExactEvmPayload, PaymentAuthorization, PaymentPayload, PriceRequirement,
};
use crate::X402_VERSION;

/// Produces a typed signature over authorization fields derived from a
/// price requirement. Implementations may take arbitrarily long; the
/// caller imposes any timeout from outside.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// The payer address signatures will recover to
    fn address(&self) -> &str;

    /// Sign a fresh authorization answering the requirement.
    ///
    /// A declined signature surfaces as
    /// [`PaylaneError::SigningRejected`] and is never retried.
    async fn sign_payment(&self, requirement: &PriceRequirement) -> Result<PaymentPayload>;
}

/// In-process signer over a local secp256k1 private key
pub struct LocalSigner {
    signing_key: SigningKey,
    address: String,
    clock_skew_secs: u64,
}

impl LocalSigner {
    /// Create a signer from a private key (hex, with or without 0x prefix)
    pub fn new(private_key: &str, clock_skew_secs: u64) -> Result<Self> {
        let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
        let key_bytes = hex::decode(key_hex).map_err(|e| PaylaneError::SigningRejected {
            reason: format!("invalid private key hex: {e}"),
        })?;

        let signing_key =
            SigningKey::from_slice(&key_bytes).map_err(|e| PaylaneError::SigningRejected {
                reason: format!("invalid private key: {e}"),
            })?;

        let address = address_from_verifying_key(signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
            clock_skew_secs,
        })
    }

    /// Fresh 128-bit nonce, 0x-prefixed hex
    fn generate_nonce() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("0x{}", hex::encode(bytes))
    }
}

#[async_trait]
impl PaymentSigner for LocalSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_payment(&self, requirement: &PriceRequirement) -> Result<PaymentPayload> {
        let chain_id = chain_id_from_network(&requirement.network).ok_or_else(|| {
            PaylaneError::SigningRejected {
                reason: format!("unsupported network: {}", requirement.network),
            }
        })?;

        // Validity window anchored around now: a clock-skew allowance in
        // the past, the requirement's max timeout into the future.
        let now = chrono::Utc::now().timestamp() as u64;
        let valid_after = now.saturating_sub(self.clock_skew_secs);
        let valid_before = now + requirement.max_timeout_seconds;

        let authorization = PaymentAuthorization {
            from: self.address.clone(),
            to: requirement.pay_to.to_lowercase(),
            value: requirement.max_amount_required.clone(),
            valid_after: valid_after.to_string(),
            valid_before: valid_before.to_string(),
            nonce: Self::generate_nonce(),
        };

        let digest = authorization_digest(&authorization, chain_id, &requirement.asset)?;

        let (signature, recovery) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| PaylaneError::SigningRejected {
                reason: format!("signing failed: {e}"),
            })?;

        let mut sig_bytes = [0u8; 65];
        sig_bytes[..64].copy_from_slice(&signature.to_bytes());
        sig_bytes[64] = 27 + recovery.to_byte();

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            accepted: requirement.clone(),
            payload: ExactEvmPayload {
                signature: format!("0x{}", hex::encode(sig_bytes)),
                authorization,
            },
        })
    }
}
