//! OS-secured token cache store for public clients.
//!
//! The serialized cache lives in the platform credential store (Keychain, Secret Service or
//! kernel keyutils, Windows Credential Manager) via `keyring`. A small marker file next to the
//! application's data holds a write stamp, never token material; other processes compare the
//! stamp to notice that the secure entry changed and reload it.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	process,
};
// crates.io
use keyring::Entry;
// self
use crate::{
	_prelude::*,
	cache::{CacheAccessArgs, CacheError, CacheFuture, CacheSerializer, TokenCache},
	config::DurableCacheOptions,
};

/// Secret storage holding one serialized cache blob.
pub trait SecureStorage
where
	Self: Send + Sync,
{
	/// Reads the blob, or `None` when nothing was stored.
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError>;

	/// Writes the blob, replacing any previous one.
	fn store(&self, blob: &[u8]) -> Result<(), CacheError>;

	/// Deletes the blob; deleting a missing blob succeeds.
	fn clear(&self) -> Result<(), CacheError>;
}

/// [`SecureStorage`] backed by the platform credential store.
pub struct KeyringStorage {
	entry: Entry,
}
impl KeyringStorage {
	/// Opens the credential-store entry for `service` / `account`.
	pub fn new(service: &str, account: &str) -> Result<Self, CacheError> {
		let entry = Entry::new(service, account).map_err(|e| CacheError::Backend {
			message: format!("Failed to open credential store entry {service}/{account}: {e}"),
		})?;

		Ok(Self { entry })
	}
}
impl SecureStorage for KeyringStorage {
	fn load(&self) -> Result<Option<Vec<u8>>, CacheError> {
		match self.entry.get_secret() {
			Ok(blob) => Ok(Some(blob)),
			Err(keyring::Error::NoEntry) => Ok(None),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to read the credential store: {e}"),
			}),
		}
	}

	fn store(&self, blob: &[u8]) -> Result<(), CacheError> {
		self.entry.set_secret(blob).map_err(|e| CacheError::Backend {
			message: format!("Failed to write the credential store: {e}"),
		})
	}

	fn clear(&self) -> Result<(), CacheError> {
		match self.entry.delete_credential() {
			Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to delete the credential store entry: {e}"),
			}),
		}
	}
}
impl Debug for KeyringStorage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("KeyringStorage(..)")
	}
}

/// Durable, cross-process cache store for public-client token caches.
pub struct DurableCacheStore {
	storage: Box<dyn SecureStorage>,
	marker_path: PathBuf,
	last_stamp: Mutex<Option<String>>,
}
impl DurableCacheStore {
	/// Opens the keyring partition described by `options`.
	///
	/// The marker file goes to `options.path`, or to
	/// `<data_local_dir>/<vendor>/<process>/<version>/token_cache.dat`.
	///
	/// The keyring service and account names derive from vendor, process, and version only.
	/// Stores opened with different `options.path` values but the same triple therefore share
	/// one secure blob, and the last writer wins; vary the vendor, application, or version to
	/// keep them apart.
	pub fn open(options: &DurableCacheOptions) -> Result<Self, CacheError> {
		let marker_path = match &options.path {
			Some(path) => path.clone(),
			None => options.default_marker_path().ok_or_else(|| CacheError::Backend {
				message: "No per-user data directory is available for the cache marker.".into(),
			})?,
		};
		let storage = KeyringStorage::new(&options.service_name(), &options.account_name())?;

		Ok(Self::with_storage(storage, marker_path))
	}

	/// Builds a store over any [`SecureStorage`] backend.
	pub fn with_storage(
		storage: impl 'static + SecureStorage,
		marker_path: impl Into<PathBuf>,
	) -> Self {
		Self {
			storage: Box::new(storage),
			marker_path: marker_path.into(),
			last_stamp: Mutex::new(None),
		}
	}

	/// Wires this store's hooks into `cache`.
	pub fn initialize(self: &Arc<Self>, cache: &TokenCache) {
		cache.set_serializer(self.clone());
	}

	/// Location of the change marker.
	pub fn marker_path(&self) -> &Path {
		&self.marker_path
	}

	fn read_stamp(&self) -> Result<Option<String>, CacheError> {
		match fs::read_to_string(&self.marker_path) {
			Ok(stamp) => Ok(Some(stamp)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to read {}: {e}", self.marker_path.display()),
			}),
		}
	}

	fn write_stamp(&self) -> Result<String, CacheError> {
		if let Some(parent) = self.marker_path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| CacheError::Backend {
				message: format!("Failed to create cache directory {}: {e}", parent.display()),
			})?;
		}

		let stamp = format!(
			"{}:{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos()
		);
		let mut tmp_path = self.marker_path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| CacheError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(stamp.as_bytes()).map_err(|e| CacheError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| CacheError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.marker_path).map_err(|e| CacheError::Backend {
			message: format!("Failed to replace {}: {e}", self.marker_path.display()),
		})?;

		Ok(stamp)
	}

	fn remove_marker(&self) -> Result<(), CacheError> {
		match fs::remove_file(&self.marker_path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(CacheError::Backend {
				message: format!("Failed to remove {}: {e}", self.marker_path.display()),
			}),
		}
	}

	fn load_into(&self, cache: &TokenCache) -> Result<(), CacheError> {
		let Some(stamp) = self.read_stamp()? else {
			return Ok(());
		};
		let mut last = self.last_stamp.lock();

		if last.as_deref() == Some(stamp.as_str()) {
			return Ok(());
		}
		if let Some(blob) = self.storage.load()? {
			cache.deserialize(&blob)?;
		}

		*last = Some(stamp);

		Ok(())
	}

	fn save_from(&self, cache: &TokenCache) -> Result<(), CacheError> {
		let mut last = self.last_stamp.lock();

		if cache.has_tokens() {
			self.storage.store(&cache.serialize()?)?;

			*last = Some(self.write_stamp()?);
		} else {
			self.storage.clear()?;
			self.remove_marker()?;

			*last = None;
		}

		Ok(())
	}
}
impl CacheSerializer for DurableCacheStore {
	fn before_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> CacheFuture<'a, ()> {
		Box::pin(async move { self.load_into(args.cache) })
	}

	fn after_access<'a>(&'a self, args: CacheAccessArgs<'a>) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			if args.has_state_changed { self.save_from(args.cache) } else { Ok(()) }
		})
	}
}
impl Debug for DurableCacheStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DurableCacheStore").field("marker_path", &self.marker_path).finish()
	}
}
