//! Logging capability handed to the orchestrator and token clients.

// self
use crate::_prelude::*;

/// Severity of an [`AuthLogger`] message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
	/// Fine-grained diagnostics.
	Verbose,
	/// Normal progress.
	Information,
	/// Recoverable problems.
	Warning,
	/// Failures surfaced to the caller.
	Error,
}

/// Sink for engine diagnostics; messages never contain token material.
pub trait AuthLogger
where
	Self: Send + Sync,
{
	/// Writes one message with an optional underlying error.
	fn log(&self, level: LogLevel, message: &str, error: Option<&(dyn StdError + 'static)>);
}

/// Forwards messages to `tracing` events when the `tracing` feature is enabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;
impl AuthLogger for TracingLogger {
	fn log(&self, level: LogLevel, message: &str, error: Option<&(dyn StdError + 'static)>) {
		#[cfg(feature = "tracing")]
		{
			let error = error.map(|err| err.to_string());

			match level {
				LogLevel::Verbose => tracing::debug!(error = error.as_deref(), "{message}"),
				LogLevel::Information => tracing::info!(error = error.as_deref(), "{message}"),
				LogLevel::Warning => tracing::warn!(error = error.as_deref(), "{message}"),
				LogLevel::Error => tracing::error!(error = error.as_deref(), "{message}"),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (level, message, error);
		}
	}
}

/// Discards every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;
impl AuthLogger for NoopLogger {
	fn log(&self, _: LogLevel, _: &str, _: Option<&(dyn StdError + 'static)>) {}
}
