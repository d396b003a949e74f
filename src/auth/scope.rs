//! Scope sets and the resource-to-scope conventions of the business-data service.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Delegated scope suffix requested by public (user) clients.
pub const USER_IMPERSONATION: &str = "user_impersonation";
/// App-only scope suffix requested by confidential clients.
pub const DEFAULT_SCOPE: &str = ".default";
/// OIDC scopes added to every user flow so an account and a refresh token come back.
pub const RESERVED_SCOPES: [&str; 3] = ["offline_access", "openid", "profile"];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized set of OAuth scopes.
///
/// Scopes are deduplicated and sorted so equality, ordering, and hashing stay consistent.
/// Cached access tokens are matched by [`is_superset_of`](Self::is_superset_of).
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(Self { scopes: normalize(scopes)? })
	}

	/// Delegated scope for a user acting against `resource` (`{resource}/user_impersonation`).
	pub fn user_impersonation(resource: &Url) -> Self {
		Self::single(format!("{}{USER_IMPERSONATION}", resource_prefix(resource)))
	}

	/// App-only scope for a confidential client against `resource` (`{resource}/.default`).
	pub fn app_default(resource: &Url) -> Self {
		Self::single(format!("{}{DEFAULT_SCOPE}", resource_prefix(resource)))
	}

	/// Returns a copy extended with [`RESERVED_SCOPES`].
	pub fn with_reserved(&self) -> Self {
		let mut set = self.scopes.iter().cloned().collect::<BTreeSet<_>>();

		set.extend(RESERVED_SCOPES.iter().map(|scope| (*scope).to_owned()));

		Self { scopes: Arc::from(set.into_iter().collect::<Vec<_>>()) }
	}

	/// Returns a copy without [`RESERVED_SCOPES`].
	pub fn without_reserved(&self) -> Self {
		let scopes = self
			.scopes
			.iter()
			.filter(|scope| !RESERVED_SCOPES.contains(&scope.as_str()))
			.cloned()
			.collect::<Vec<_>>();

		Self { scopes: Arc::from(scopes) }
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Returns true if every scope in `other` is also present here.
	pub fn is_superset_of(&self, other: &ScopeSet) -> bool {
		other.iter().all(|scope| self.contains(scope))
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(|s| s.as_str())
	}

	/// Returns the normalized string representation (space-delimited).
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	fn single(scope: String) -> Self {
		Self { scopes: Arc::from(vec![scope]) }
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

/// Renders `resource` with exactly one trailing slash, ready for scope concatenation.
pub fn resource_prefix(resource: &Url) -> String {
	let raw = resource.as_str();

	if raw.ends_with('/') { raw.to_owned() } else { format!("{raw}/") }
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Resource fixture should parse.")
	}

	#[test]
	fn resource_scopes_always_use_a_single_slash() {
		let bare = url("https://svc.example.test");
		let slashed = url("https://svc.example.test/");
		let nested = url("https://svc.example.test/tenant/");

		assert_eq!(
			ScopeSet::user_impersonation(&bare).normalized(),
			"https://svc.example.test/user_impersonation"
		);
		assert_eq!(ScopeSet::app_default(&slashed).normalized(), "https://svc.example.test/.default");
		assert_eq!(
			ScopeSet::app_default(&nested).normalized(),
			"https://svc.example.test/tenant/.default"
		);
	}

	#[test]
	fn reserved_scopes_are_added_and_stripped() {
		let scope = ScopeSet::user_impersonation(&url("https://svc.example.test"));
		let extended = scope.with_reserved();

		assert_eq!(extended.iter().count(), 4);
		assert!(extended.contains("offline_access"));
		assert!(extended.is_superset_of(&scope));
		assert_eq!(extended.without_reserved(), scope);
	}

	#[test]
	fn scopes_normalize_and_compare_by_content() {
		let lhs = ScopeSet::new(["profile", "email", "email"])
			.expect("Left-hand scope set should be valid.");
		let rhs =
			ScopeSet::new(["email", "profile"]).expect("Right-hand scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "email profile");
		assert!(lhs.is_superset_of(&rhs) && rhs.is_superset_of(&lhs));
	}

	#[test]
	fn invalid_scopes_error() {
		assert!(ScopeSet::new([""]).is_err());
		assert!(ScopeSet::new(["contains space"]).is_err());
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}
}
