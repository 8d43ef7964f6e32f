//! Paylane gate - Payment gate middleware
//!
//! Wraps protected axum routes in the x402 challenge cycle:
//!
//! - No payment header: respond 402 with an encoded challenge
//! - Payment header present: verify, run the inner handler, settle
//! - Settlement happens only after the handler succeeded, and the result
//!   is withheld if settlement fails
//!
//! The gate owns no settlement logic; it drives a
//! [`PaymentVerifier`](paylane_x402::PaymentVerifier) it was given.

pub mod gate;

pub use gate::*;
