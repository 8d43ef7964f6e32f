//! In-process facilitator
//!
//! [`LocalFacilitator`] implements [`PaymentVerifier`] without leaving the
//! process: ledger balances live in a [`DashMap`], settled nonces in a
//! burn set. Verification is pure inspection; settlement burns the nonce
//! first and only then moves value, so a replayed authorization can settle
//! at most once no matter how many times it is submitted.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use paylane_types::Result;
use tracing::{debug, info};

use crate::eip712::{authorization_digest, keccak256, recover_address};
use crate::types::{chain_id_from_network, PaymentPayload, PriceRequirement};
use crate::verify::{PaymentVerifier, SettleOutcome, VerifyOutcome};
use crate::{SCHEME_EXACT, X402_VERSION};

/// In-memory verifier and settlement ledger
pub struct LocalFacilitator {
    network: String,
    balances: DashMap<String, u64>,
    used_nonces: DashSet<String>,
}

impl LocalFacilitator {
    /// Facilitator for one network (`eip155:<chain id>` form)
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            balances: DashMap::new(),
            used_nonces: DashSet::new(),
        }
    }

    /// Network this facilitator settles on
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Credit an address. Used to fund payers before they spend.
    pub fn deposit(&self, address: &str, amount_minor: u64) -> u64 {
        let mut entry = self
            .balances
            .entry(address.to_lowercase())
            .or_insert(0);
        *entry = entry.saturating_add(amount_minor);
        info!(address = %address.to_lowercase(), balance = *entry, "deposit credited");
        *entry
    }

    /// Current balance of an address in minor units
    pub fn balance(&self, address: &str) -> u64 {
        self.balances
            .get(&address.to_lowercase())
            .map(|b| *b)
            .unwrap_or(0)
    }

    /// Burn-set key for an authorization: nonces are scoped per payer
    fn nonce_key(from: &str, nonce: &str) -> String {
        format!("{}:{}", from.to_lowercase(), nonce.to_lowercase())
    }

    /// All structural and cryptographic checks shared by verify and settle.
    ///
    /// Returns the recovered payer address on success, or the facilitator's
    /// reason string on rejection. Only malformed inputs (undecodable
    /// fields) surface as `Err`.
    fn check(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<std::result::Result<String, String>> {
        if payload.x402_version != X402_VERSION {
            return Ok(Err(format!(
                "unsupported x402 version: {}",
                payload.x402_version
            )));
        }
        if requirement.scheme != SCHEME_EXACT {
            return Ok(Err(format!("unsupported scheme: {}", requirement.scheme)));
        }
        if requirement.network != self.network {
            return Ok(Err(format!(
                "wrong network: expected {}, got {}",
                self.network, requirement.network
            )));
        }

        let auth = &payload.payload.authorization;

        if !auth.to.eq_ignore_ascii_case(&requirement.pay_to) {
            return Ok(Err("payee mismatch".to_string()));
        }
        if auth.value != requirement.max_amount_required {
            return Ok(Err(format!(
                "amount mismatch: expected {}, got {}",
                requirement.max_amount_required, auth.value
            )));
        }

        let Some(chain_id) = chain_id_from_network(&requirement.network) else {
            return Ok(Err(format!("unparseable network: {}", requirement.network)));
        };

        let now = Utc::now().timestamp() as u64;
        let valid_after: u64 = match auth.valid_after.parse() {
            Ok(v) => v,
            Err(_) => return Ok(Err("invalid validAfter".to_string())),
        };
        let valid_before: u64 = match auth.valid_before.parse() {
            Ok(v) => v,
            Err(_) => return Ok(Err("invalid validBefore".to_string())),
        };
        if now < valid_after {
            return Ok(Err("authorization not yet valid".to_string()));
        }
        if now >= valid_before {
            return Ok(Err("authorization expired".to_string()));
        }

        let digest = authorization_digest(auth, chain_id, &requirement.asset)?;
        let recovered = recover_address(&digest, &payload.payload.signature)?;
        if !recovered.eq_ignore_ascii_case(&auth.from) {
            return Ok(Err("signature does not match payer".to_string()));
        }

        if self
            .used_nonces
            .contains(&Self::nonce_key(&auth.from, &auth.nonce))
        {
            return Ok(Err("nonce already used".to_string()));
        }

        if self.balance(&auth.from) < requirement.amount_minor().unwrap_or(u64::MAX) {
            return Ok(Err("insufficient funds".to_string()));
        }

        Ok(Ok(recovered))
    }

    /// Synthetic transaction reference derived from the settled signature
    fn transaction_ref(payload: &PaymentPayload) -> String {
        let sig = payload.payload.signature.as_bytes();
        format!("0x{}", hex::encode(keccak256(sig)))
    }
}

#[async_trait]
impl PaymentVerifier for LocalFacilitator {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<VerifyOutcome> {
        match self.check(payload, requirement)? {
            Ok(payer) => {
                debug!(%payer, "payment verified");
                Ok(VerifyOutcome {
                    success: true,
                    error_reason: None,
                    payer: Some(payer),
                })
            }
            Err(reason) => {
                debug!(%reason, "payment rejected");
                Ok(VerifyOutcome {
                    success: false,
                    error_reason: Some(reason),
                    payer: None,
                })
            }
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<SettleOutcome> {
        let payer = match self.check(payload, requirement)? {
            Ok(payer) => payer,
            Err(reason) => {
                return Ok(SettleOutcome {
                    success: false,
                    transaction: None,
                    error_reason: Some(reason),
                    payer: None,
                })
            }
        };

        let auth = &payload.payload.authorization;
        let amount = requirement.amount_minor().unwrap_or(0);

        // Burn before moving value. `insert` returning false means another
        // settlement of the same authorization won the race.
        if !self
            .used_nonces
            .insert(Self::nonce_key(&auth.from, &auth.nonce))
        {
            return Ok(SettleOutcome {
                success: false,
                transaction: None,
                error_reason: Some("nonce already used".to_string()),
                payer: None,
            });
        }

        {
            let mut from_balance = self.balances.entry(payer.clone()).or_insert(0);
            if *from_balance < amount {
                drop(from_balance);
                self.used_nonces
                    .remove(&Self::nonce_key(&auth.from, &auth.nonce));
                return Ok(SettleOutcome {
                    success: false,
                    transaction: None,
                    error_reason: Some("insufficient funds".to_string()),
                    payer: None,
                });
            }
            *from_balance -= amount;
        }
        let mut to_balance = self.balances.entry(auth.to.to_lowercase()).or_insert(0);
        *to_balance = to_balance.saturating_add(amount);
        drop(to_balance);

        let transaction = Self::transaction_ref(payload);
        info!(%payer, to = %auth.to, amount, %transaction, "payment settled");

        Ok(SettleOutcome {
            success: true,
            transaction: Some(transaction),
            error_reason: None,
            payer: Some(payer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{LocalSigner, PaymentSigner};
    use paylane_types::Price;

    const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PAYER_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const PAYEE: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
    const ASSET: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";
    const NETWORK: &str = "eip155:5042002";

    fn requirement() -> PriceRequirement {
        PriceRequirement::exact(NETWORK, Price::from_minor(5000), PAYEE, ASSET, 90)
    }

    async fn signed_payment() -> PaymentPayload {
        let signer = LocalSigner::new(PAYER_KEY, 60).unwrap();
        signer.sign_payment(&requirement()).await.unwrap()
    }

    fn funded_facilitator() -> LocalFacilitator {
        let facilitator = LocalFacilitator::new(NETWORK);
        facilitator.deposit(PAYER_ADDRESS, 100_000);
        facilitator
    }

    #[tokio::test]
    async fn test_verify_then_settle_moves_funds() {
        let facilitator = funded_facilitator();
        let payment = signed_payment().await;

        let verified = facilitator.verify(&payment, &requirement()).await.unwrap();
        assert!(verified.success);
        assert_eq!(verified.payer.as_deref(), Some(PAYER_ADDRESS));

        let settled = facilitator.settle(&payment, &requirement()).await.unwrap();
        assert!(settled.success);
        assert!(settled.transaction.unwrap().starts_with("0x"));
        assert_eq!(facilitator.balance(PAYER_ADDRESS), 95_000);
        assert_eq!(facilitator.balance(PAYEE), 5_000);
    }

    #[tokio::test]
    async fn test_replay_settles_at_most_once() {
        let facilitator = funded_facilitator();
        let payment = signed_payment().await;

        let first = facilitator.settle(&payment, &requirement()).await.unwrap();
        assert!(first.success);

        let second = facilitator.settle(&payment, &requirement()).await.unwrap();
        assert!(!second.success);
        assert_eq!(second.error_reason.as_deref(), Some("nonce already used"));
        assert_eq!(facilitator.balance(PAYEE), 5_000);
    }

    #[tokio::test]
    async fn test_tampered_amount_is_rejected() {
        let facilitator = funded_facilitator();
        let mut payment = signed_payment().await;
        payment.payload.authorization.value = "1".to_string();

        let outcome = facilitator.verify(&payment, &requirement()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_reason.unwrap().contains("amount mismatch"));
    }

    #[tokio::test]
    async fn test_tampered_payee_fails_signature_check() {
        let facilitator = funded_facilitator();
        let mut payment = signed_payment().await;
        // Re-point the transfer without re-signing; recovery diverges.
        payment.payload.authorization.to = PAYER_ADDRESS.to_string();
        let mut req = requirement();
        req.pay_to = PAYER_ADDRESS.to_string();

        let outcome = facilitator.verify(&payment, &req).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_expired_authorization_is_rejected() {
        let facilitator = funded_facilitator();
        let mut payment = signed_payment().await;
        let past = (Utc::now().timestamp() - 10) as u64;
        payment.payload.authorization.valid_before = past.to_string();

        let outcome = facilitator.verify(&payment, &requirement()).await.unwrap();
        assert!(!outcome.success);
        // Window tampering also breaks the signature, but the window check
        // fires first.
        assert_eq!(
            outcome.error_reason.as_deref(),
            Some("authorization expired")
        );
    }

    #[tokio::test]
    async fn test_unfunded_payer_is_rejected() {
        let facilitator = LocalFacilitator::new(NETWORK);
        let payment = signed_payment().await;

        let outcome = facilitator.verify(&payment, &requirement()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_reason.as_deref(), Some("insufficient funds"));
    }

    #[tokio::test]
    async fn test_wrong_network_is_rejected() {
        let facilitator = LocalFacilitator::new("eip155:1");
        facilitator.deposit(PAYER_ADDRESS, 100_000);
        let payment = signed_payment().await;

        let outcome = facilitator.verify(&payment, &requirement()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_reason.unwrap().contains("wrong network"));
    }

    #[test]
    fn test_deposit_accumulates() {
        let facilitator = LocalFacilitator::new(NETWORK);
        facilitator.deposit("0xAbC", 10);
        facilitator.deposit("0xabc", 5);
        assert_eq!(facilitator.balance("0xABC"), 15);
    }
}
