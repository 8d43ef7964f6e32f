//! x402 protocol data types

use paylane_types::Price;
use serde::{Deserialize, Serialize};

use crate::{SCHEME_EXACT, X402_VERSION};

/// What a protected endpoint charges, derived per endpoint from static
/// price configuration. Immutable for the lifetime of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequirement {
    /// Payment scheme; always `exact`
    pub scheme: String,
    /// Network/domain id, `eip155:<chain id>` form
    pub network: String,
    /// Amount in minor units of the asset, decimal string
    pub max_amount_required: String,
    /// Payee address
    pub pay_to: String,
    /// Verifying contract address of the settlement asset
    pub asset: String,
    /// Longest validity window the payee will accept, in seconds
    pub max_timeout_seconds: u64,
    /// Resource being paid for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PriceRequirement {
    /// Build an exact-scheme requirement for a fixed price
    pub fn exact(
        network: impl Into<String>,
        price: Price,
        pay_to: impl Into<String>,
        asset: impl Into<String>,
        max_timeout_seconds: u64,
    ) -> Self {
        Self {
            scheme: SCHEME_EXACT.to_string(),
            network: network.into(),
            max_amount_required: price.minor().to_string(),
            pay_to: pay_to.into(),
            asset: asset.into(),
            max_timeout_seconds,
            resource: None,
            description: None,
        }
    }

    /// Attach the resource path this requirement protects
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Amount in minor units, if the decimal string parses
    pub fn amount_minor(&self) -> Option<u64> {
        self.max_amount_required.parse().ok()
    }
}

/// The 402 challenge body carried in the challenge header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub x402_version: u8,
    /// Requirements the payee accepts; exactly one per gated endpoint here
    pub accepts: Vec<PriceRequirement>,
}

impl PaymentChallenge {
    /// Challenge offering a single requirement
    pub fn single(requirement: PriceRequirement) -> Self {
        Self {
            x402_version: X402_VERSION,
            accepts: vec![requirement],
        }
    }

    /// First offered requirement, if any
    pub fn requirement(&self) -> Option<&PriceRequirement> {
        self.accepts.first()
    }
}

/// A signed, time-bound, single-use transfer authorization (EIP-3009
/// TransferWithAuthorization fields). Built fresh per attempt; replay is
/// prevented by nonce uniqueness at the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    /// Payer address
    pub from: String,
    /// Payee address
    pub to: String,
    /// Amount in minor units, decimal string
    pub value: String,
    /// Unix seconds; authorization invalid before this instant
    pub valid_after: String,
    /// Unix seconds; authorization invalid at and after this instant
    pub valid_before: String,
    /// Single-use 128-bit nonce, 0x-prefixed hex
    pub nonce: String,
}

/// Signature plus the authorization it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// 65-byte r||s||v secp256k1 signature, 0x-prefixed hex
    pub signature: String,
    pub authorization: PaymentAuthorization,
}

/// What the payer attaches to the retried request. Bound to exactly one
/// [`PriceRequirement`] instance (echoed in `accepted`); invalid once
/// settled or once its validity window lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    /// The requirement instance this payment answers
    pub accepted: PriceRequirement,
    pub payload: ExactEvmPayload,
}

/// Settlement result carried in the settlement response header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub success: bool,
    /// Transaction reference produced by settlement
    pub transaction: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Parse a chain id out of an `eip155:<id>` network string
pub fn chain_id_from_network(network: &str) -> Option<u64> {
    network.strip_prefix("eip155:")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_wire_shape() {
        let req = PriceRequirement::exact(
            "eip155:5042002",
            Price::from_minor(5000),
            "0xpayee",
            "0xasset",
            90,
        )
        .with_resource("/run");

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["scheme"], "exact");
        assert_eq!(json["maxAmountRequired"], "5000");
        assert_eq!(json["payTo"], "0xpayee");
        assert_eq!(json["maxTimeoutSeconds"], 90);
        assert_eq!(json["resource"], "/run");
    }

    #[test]
    fn test_amount_minor() {
        let req = PriceRequirement::exact("eip155:1", Price::from_minor(8000), "a", "b", 60);
        assert_eq!(req.amount_minor(), Some(8000));
    }

    #[test]
    fn test_chain_id_from_network() {
        assert_eq!(chain_id_from_network("eip155:5042002"), Some(5042002));
        assert_eq!(chain_id_from_network("mainnet"), None);
    }

    #[test]
    fn test_challenge_single() {
        let req = PriceRequirement::exact("eip155:1", Price::from_minor(1), "a", "b", 60);
        let challenge = PaymentChallenge::single(req.clone());
        assert_eq!(challenge.x402_version, X402_VERSION);
        assert_eq!(challenge.requirement(), Some(&req));
    }
}
