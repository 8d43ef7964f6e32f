//! Paylane client - Paid HTTP caller
//!
//! Drives the payer side of the x402 cycle against a gated endpoint:
//!
//! - Probe the endpoint; a 402 carries the payee's challenge
//! - Pre-check the challenge against the caller's own policy before any
//!   signature is produced
//! - Sign a fresh authorization and retry exactly once
//! - A second 402 is a hard failure, never another payment attempt
//!
//! Signing is delegated to a [`PaymentSigner`](paylane_x402::PaymentSigner)
//! and may take arbitrarily long; callers impose timeouts from outside.

pub mod caller;

pub use caller::*;
