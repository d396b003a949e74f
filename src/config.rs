//! Engine-wide configuration threaded through the orchestrator, resolver, and caches.

// std
use std::{env, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::ConfigError};

const DEFAULT_API_VERSION: &str = "9.2";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MEMORY_CACHE_LIFETIME_SECS: u64 = 14 * 24 * 60 * 60;
const DEFAULT_EXPIRED_HINT_FALLBACK_SECS: u64 = 60 * 60;
const DEFAULT_VENDOR: &str = "dataverse-auth";

/// Settings shared by every authentication attempt.
///
/// Every field has a default, so partial documents deserialize cleanly:
///
/// ```
/// let config = dataverse_auth::config::AuthConfig::from_json(r#"{"api_version":"9.1"}"#)?;
///
/// assert_eq!(config.api_version, "9.1");
/// assert!(config.use_versioned_endpoint);
/// # Ok::<(), dataverse_auth::error::ConfigError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
	/// Web API version appended to the service URL (`/api/data/v{api_version}/`).
	pub api_version: String,
	/// Rewrites the service URL to the version-tagged Web API endpoint before probing.
	pub use_versioned_endpoint: bool,
	/// Timeout applied to the authority probe.
	pub probe_timeout_secs: u64,
	/// Lifetime given to in-memory cache entries when no expiry is suggested.
	pub memory_cache_lifetime_secs: u64,
	/// Lifetime given to in-memory cache entries whose suggested expiry already passed.
	pub expired_hint_fallback_secs: u64,
	/// Naming of the OS-secured durable cache.
	pub durable_cache: DurableCacheOptions,
	/// User agent sent with probe and token requests.
	pub user_agent: Option<String>,
}
impl AuthConfig {
	/// Parses a JSON configuration document, reporting the failing field path on error.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de).map_err(|source| ConfigError::Parse { source })
	}

	/// Probe timeout as a std duration for the HTTP client.
	pub fn probe_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.probe_timeout_secs)
	}

	/// Default lifetime of a memory cache entry.
	pub fn memory_cache_lifetime(&self) -> Duration {
		Duration::seconds(clamp_secs(self.memory_cache_lifetime_secs))
	}

	/// Lifetime used when a suggested expiry is already in the past.
	pub fn expired_hint_fallback(&self) -> Duration {
		Duration::seconds(clamp_secs(self.expired_hint_fallback_secs))
	}
}
impl Default for AuthConfig {
	fn default() -> Self {
		Self {
			api_version: DEFAULT_API_VERSION.into(),
			use_versioned_endpoint: true,
			probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
			memory_cache_lifetime_secs: DEFAULT_MEMORY_CACHE_LIFETIME_SECS,
			expired_hint_fallback_secs: DEFAULT_EXPIRED_HINT_FALLBACK_SECS,
			durable_cache: DurableCacheOptions::default(),
			user_agent: None,
		}
	}
}

/// Identity of the durable cache partition: one per (vendor, process, version) triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableCacheOptions {
	/// Vendor (publisher) folder and keyring service prefix.
	pub vendor: String,
	/// Host process name; defaults to the running executable's file stem.
	pub application: Option<String>,
	/// Product version; defaults to this crate's version.
	pub version: String,
	/// Explicit marker file location overriding the per-user data directory.
	pub path: Option<PathBuf>,
}
impl DurableCacheOptions {
	/// Resolved host-process name.
	pub fn application_name(&self) -> String {
		self.application.clone().unwrap_or_else(|| {
			env::current_exe()
				.ok()
				.and_then(|exe| exe.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
				.unwrap_or_else(|| DEFAULT_VENDOR.into())
		})
	}

	/// Keyring service name shared by every account entry of this partition.
	pub fn service_name(&self) -> String {
		format!("{}.{}", self.vendor, self.application_name())
	}

	/// Keyring account name, unique per product version.
	pub fn account_name(&self) -> String {
		format!("{}_{}", self.application_name(), self.version)
	}

	/// Default marker file: `<data_local_dir>/<vendor>/<process>/<version>/token_cache.dat`.
	pub fn default_marker_path(&self) -> Option<PathBuf> {
		dirs::data_local_dir().map(|base| {
			base.join(&self.vendor)
				.join(self.application_name())
				.join(&self.version)
				.join("token_cache.dat")
		})
	}
}
impl Default for DurableCacheOptions {
	fn default() -> Self {
		Self {
			vendor: DEFAULT_VENDOR.into(),
			application: None,
			version: env!("CARGO_PKG_VERSION").into(),
			path: None,
		}
	}
}

fn clamp_secs(secs: u64) -> i64 {
	i64::try_from(secs).unwrap_or(i64::MAX)
}
