//! Observability helpers: flow spans, outcome counters, and the logging capability.
//!
//! # Feature Flags
//!
//! - `tracing` emits spans named `dataverse_auth.flow` carrying `flow` and `stage` fields, and
//!   routes [`TracingLogger`] messages to `tracing` events.
//! - `metrics` increments `dataverse_auth_flow_total` for every attempt, success, and failure,
//!   labeled by `flow` and `outcome`.

mod log;
mod metrics;
mod tracing;

pub use log::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Unauthenticated authority discovery probe.
	AuthorityProbe,
	/// Full orchestrated authentication, including the bounded retry.
	Authenticate,
	/// Silent acquisition from the client's token cache.
	Silent,
	/// Resource-owner password grant.
	UsernamePassword,
	/// Integrated (OS identity) sign-in.
	Integrated,
	/// Interactive authorization-code sign-in.
	Interactive,
	/// Confidential client credential grant.
	Client,
	/// Caller-supplied external token.
	External,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorityProbe => "authority_probe",
			FlowKind::Authenticate => "authenticate",
			FlowKind::Silent => "silent",
			FlowKind::UsernamePassword => "username_password",
			FlowKind::Integrated => "integrated",
			FlowKind::Interactive => "interactive",
			FlowKind::Client => "client",
			FlowKind::External => "external",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
