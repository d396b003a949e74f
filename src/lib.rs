//! Authentication and token-lifecycle engine for business-data service clients: discover the
//! authority behind an endpoint, pick a credential strategy, acquire bearer tokens, and keep
//! them fresh through in-memory or OS-secured caches.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authority;
pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod ext;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod orchestrator;
pub mod strategy;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		authority::AuthorityResolver,
		cache::MemoryCacheStore,
		client::{ClientFactory, OAuthClientFactory},
		config::AuthConfig,
		http::ReqwestHttpClient,
		orchestrator::AuthOrchestrator,
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Authority resolver that talks to `httpmock` servers.
	pub fn test_authority_resolver() -> AuthorityResolver {
		AuthorityResolver::with_http_client(test_reqwest_http_client())
	}

	/// Constructs an [`AuthOrchestrator`] backed by a private memory cache and the insecure test
	/// transport, returning the cache so tests can inspect it.
	///
	/// Public clients share the same memory cache, so tests never touch the OS keychain.
	pub fn build_test_orchestrator(config: AuthConfig) -> (AuthOrchestrator, Arc<MemoryCacheStore>) {
		let memory_cache = Arc::new(MemoryCacheStore::with_config(&config));
		let factory: Arc<dyn ClientFactory> =
			Arc::new(OAuthClientFactory::with_http_client(test_reqwest_http_client()));
		let orchestrator = AuthOrchestrator::new(config)
			.with_resolver(test_authority_resolver())
			.with_client_factory(factory)
			.with_memory_cache(memory_cache.clone())
			.with_public_cache(memory_cache.clone());

		(orchestrator, memory_cache)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::{Path, PathBuf},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
