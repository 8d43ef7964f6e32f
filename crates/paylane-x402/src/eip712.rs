//! EIP-712 digest construction for EIP-3009 transfer authorizations
//!
//! Both sides of the protocol use these helpers: the signer to produce the
//! digest it signs, the facilitator to recover the payer address from a
//! submitted signature.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use paylane_types::{PaylaneError, Result};
use sha3::{Digest, Keccak256};

use crate::types::PaymentAuthorization;

/// EIP-712 domain name of the settlement asset
pub const EIP712_DOMAIN_NAME: &str = "USD Coin";

/// EIP-712 domain version of the settlement asset
pub const EIP712_DOMAIN_VERSION: &str = "2";

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const TRANSFER_TYPE: &[u8] =
    b"TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

/// Keccak-256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

fn invalid_field(field: &str, value: &str) -> PaylaneError {
    PaylaneError::VerificationFailed {
        reason: format!("invalid {field}: {value}"),
    }
}

/// ABI word for an address: 20 bytes left-padded to 32
fn address_word(field: &str, addr: &str) -> Result<[u8; 32]> {
    let bytes =
        hex::decode(addr.strip_prefix("0x").unwrap_or(addr)).map_err(|_| invalid_field(field, addr))?;
    if bytes.len() != 20 {
        return Err(invalid_field(field, addr));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// ABI word for a uint256 held in a decimal string
fn uint_word(field: &str, value: &str) -> Result<[u8; 32]> {
    let v: u128 = value.parse().map_err(|_| invalid_field(field, value))?;
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&v.to_be_bytes());
    Ok(word)
}

/// ABI word for the nonce: up to 32 hex-encoded bytes, left-padded
fn nonce_word(nonce: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(nonce.strip_prefix("0x").unwrap_or(nonce))
        .map_err(|_| invalid_field("nonce", nonce))?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(invalid_field("nonce", nonce));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

/// EIP-712 domain separator for the verifying contract on a chain
pub fn domain_separator(chain_id: u64, verifying_contract: &str) -> Result<[u8; 32]> {
    let mut encoded = Vec::with_capacity(5 * 32);
    encoded.extend_from_slice(&keccak256(DOMAIN_TYPE));
    encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&uint_word("chainId", &chain_id.to_string())?);
    encoded.extend_from_slice(&address_word("verifyingContract", verifying_contract)?);
    Ok(keccak256(&encoded))
}

/// Struct hash of a TransferWithAuthorization message
fn struct_hash(auth: &PaymentAuthorization) -> Result<[u8; 32]> {
    let mut encoded = Vec::with_capacity(7 * 32);
    encoded.extend_from_slice(&keccak256(TRANSFER_TYPE));
    encoded.extend_from_slice(&address_word("from", &auth.from)?);
    encoded.extend_from_slice(&address_word("to", &auth.to)?);
    encoded.extend_from_slice(&uint_word("value", &auth.value)?);
    encoded.extend_from_slice(&uint_word("validAfter", &auth.valid_after)?);
    encoded.extend_from_slice(&uint_word("validBefore", &auth.valid_before)?);
    encoded.extend_from_slice(&nonce_word(&auth.nonce)?);
    Ok(keccak256(&encoded))
}

/// Final signing digest: keccak256("\x19\x01" || domainSeparator || structHash)
pub fn authorization_digest(
    auth: &PaymentAuthorization,
    chain_id: u64,
    verifying_contract: &str,
) -> Result<[u8; 32]> {
    let domain = domain_separator(chain_id, verifying_contract)?;
    let message = struct_hash(auth)?;

    let mut to_sign = Vec::with_capacity(66);
    to_sign.push(0x19);
    to_sign.push(0x01);
    to_sign.extend_from_slice(&domain);
    to_sign.extend_from_slice(&message);
    Ok(keccak256(&to_sign))
}

/// Ethereum address of a public key, 0x-prefixed lowercase hex
pub fn address_from_verifying_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Recover the signer address from a digest and a 65-byte r||s||v signature
pub fn recover_address(digest: &[u8; 32], signature: &str) -> Result<String> {
    let bytes = hex::decode(signature.strip_prefix("0x").unwrap_or(signature))
        .map_err(|_| invalid_field("signature", signature))?;
    if bytes.len() != 65 {
        return Err(invalid_field("signature", signature));
    }

    let v = bytes[64];
    let recovery = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
        .ok_or_else(|| invalid_field("signature recovery id", signature))?;

    let sig = EcdsaSignature::from_slice(&bytes[..64])
        .map_err(|_| invalid_field("signature", signature))?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery).map_err(|e| {
        PaylaneError::VerificationFailed {
            reason: format!("signature recovery failed: {e}"),
        }
    })?;

    Ok(address_from_verifying_key(&key))
}
