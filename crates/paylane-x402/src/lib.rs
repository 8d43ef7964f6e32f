//! Paylane x402 - Payment protocol envelope
//!
//! Implements the x402 challenge/response protocol around protected
//! operations:
//!
//! - Price requirements, payment authorizations, and payment payloads
//! - Base64 header codecs for the challenge, payment, and settlement headers
//! - EIP-712 typed signing of EIP-3009 transfer authorizations
//! - The verifier seam: an HTTP facilitator client plus an in-process
//!   facilitator with at-most-once nonce burning
//!
//! The envelope never moves money itself; settlement internals live behind
//! the [`PaymentVerifier`] trait.

pub mod eip712;
pub mod facilitator;
pub mod headers;
pub mod signer;
pub mod types;
pub mod verify;

pub use facilitator::*;
pub use headers::*;
pub use signer::*;
pub use types::*;
pub use verify::*;

/// x402 protocol version spoken by this crate
pub const X402_VERSION: u8 = 1;

/// The only payment scheme supported: an exact, fixed-amount transfer
pub const SCHEME_EXACT: &str = "exact";

/// Challenge header on a 402 response, base64 JSON [`PaymentChallenge`]
pub const HEADER_PAYMENT_REQUIRED: &str = "payment-required";

/// Request header carrying a base64 JSON [`PaymentPayload`]
pub const HEADER_PAYMENT: &str = "x-payment";

/// Response header carrying a base64 JSON [`SettlementReceipt`]
pub const HEADER_PAYMENT_RESPONSE: &str = "x-payment-response";
