//! Extension contracts for handing acquired tokens to the request dispatcher.

pub mod request_signer;

pub use request_signer::*;
