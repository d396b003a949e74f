//! Signed-in account handles and the ID-token claims they are derived from.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::AccountId};

/// Errors raised while decoding an ID token payload.
#[derive(Debug, ThisError)]
pub enum IdTokenError {
	/// The token is not a three-part compact JWT.
	#[error("ID token is not a compact JWT.")]
	Malformed,
	/// The payload segment is not valid base64url.
	#[error("ID token payload is not valid base64url.")]
	Encoding(#[from] base64::DecodeError),
	/// The payload is not a JSON claims object.
	#[error("ID token payload is not valid JSON.")]
	Claims(#[from] serde_json::Error),
	/// The claims do not identify an account.
	#[error("ID token does not carry an object or subject identifier.")]
	MissingIdentity,
}

/// Lookup handle for an identity known to a client's token cache.
///
/// Handles are plain values: the client's cache owns the underlying account record, and
/// callers keep a handle only to ask for silent tokens later.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
	/// Home account identifier (`<object id>.<tenant id>`).
	pub home_account_id: AccountId,
	/// Sign-in name (UPN or preferred username).
	pub username: String,
	/// Identity-provider host that issued the account.
	pub environment: String,
	/// Tenant the account signed into.
	pub tenant_id: Option<String>,
}
impl Account {
	/// Returns `true` when the sign-in name matches `hint`, ignoring ASCII case.
	pub fn matches_username(&self, hint: &str) -> bool {
		self.username.eq_ignore_ascii_case(hint.trim())
	}
}

/// Subset of OIDC ID-token claims used to identify the signed-in account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
	/// Object identifier of the user.
	pub oid: Option<String>,
	/// Subject identifier, used when `oid` is absent.
	pub sub: Option<String>,
	/// Tenant identifier.
	pub tid: Option<String>,
	/// Preferred username (v2 tokens).
	pub preferred_username: Option<String>,
	/// User principal name (v1 tokens).
	pub upn: Option<String>,
	/// E-mail address, used when no sign-in name is present.
	pub email: Option<String>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact ID token.
	///
	/// The signature is not verified; the token comes straight from the token endpoint over
	/// TLS and is only used to label the cache entry.
	pub fn decode(id_token: &str) -> Result<Self, IdTokenError> {
		let mut parts = id_token.split('.');
		let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
			(Some(_), Some(payload), Some(_), None) => payload,
			_ => return Err(IdTokenError::Malformed),
		};
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;

		Ok(serde_json::from_slice(&bytes)?)
	}

	/// Sign-in name in precedence order `preferred_username`, `upn`, `email`.
	pub fn username(&self) -> Option<&str> {
		self.preferred_username.as_deref().or(self.upn.as_deref()).or(self.email.as_deref())
	}

	/// Builds an [`Account`] for `environment`, falling back to `username_hint` when the claims
	/// carry no sign-in name.
	pub fn into_account(
		self,
		environment: &str,
		username_hint: Option<&str>,
	) -> Result<Account, IdTokenError> {
		let object_id =
			self.oid.as_deref().or(self.sub.as_deref()).ok_or(IdTokenError::MissingIdentity)?;
		let tenant = self.tid.as_deref().unwrap_or("common");
		let home_account_id =
			AccountId::from_parts(object_id, tenant).map_err(|_| IdTokenError::MissingIdentity)?;
		let username = self.username().or(username_hint).unwrap_or_default().to_owned();

		Ok(Account {
			home_account_id,
			username,
			environment: environment.to_owned(),
			tenant_id: self.tid,
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn compact(payload: &str) -> String {
		format!("eyJhbGciOiJub25lIn0.{}.sig", URL_SAFE_NO_PAD.encode(payload))
	}

	#[test]
	fn decodes_claims_into_account() {
		let token = compact(r#"{"oid":"o-1","tid":"t-1","preferred_username":"Ada@Contoso.test"}"#);
		let account = IdTokenClaims::decode(&token)
			.expect("Claims should decode.")
			.into_account("login.example.test", None)
			.expect("Claims should identify an account.");

		assert_eq!(account.home_account_id.as_ref(), "o-1.t-1");
		assert_eq!(account.username, "Ada@Contoso.test");
		assert!(account.matches_username(" ada@contoso.test "));
		assert!(!account.matches_username("grace@contoso.test"));
	}

	#[test]
	fn falls_back_to_username_hint_and_subject() {
		let token = compact(r#"{"sub":"s-1"}"#);
		let account = IdTokenClaims::decode(&token)
			.expect("Claims should decode.")
			.into_account("login.example.test", Some("svc@contoso.test"))
			.expect("Subject should identify the account.");

		assert_eq!(account.home_account_id.as_ref(), "s-1.common");
		assert_eq!(account.username, "svc@contoso.test");
	}

	#[test]
	fn rejects_malformed_tokens() {
		assert!(matches!(IdTokenClaims::decode("abc"), Err(IdTokenError::Malformed)));
		assert!(matches!(IdTokenClaims::decode("a.!!!.c"), Err(IdTokenError::Encoding(_))));
		assert!(matches!(
			IdTokenClaims::decode(&compact("{}")).map(|claims| claims.into_account("x", None)),
			Ok(Err(IdTokenError::MissingIdentity))
		));
	}
}
