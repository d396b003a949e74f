//! `WWW-Authenticate: Bearer` challenge parsing.
//!
//! A protected endpoint answers an unauthenticated request with a challenge such as
//!
//! ```text
//! Bearer authorization_uri=https://login.example.test/common/oauth2/authorize, resource_id=https://org.example.test/
//! ```
//!
//! The parser is strict: the scheme must be `bearer` followed by whitespace and the parameters
//! must be comma-separated `key=value` pairs.

// self
use crate::_prelude::*;

const AUTHORIZATION_URI: &str = "authorization_uri";
const RESOURCE_ID: &str = "resource_id";
const AUTHORIZE_SUFFIX: &str = "oauth2/authorize";
const COMMON_TENANT: &str = "common";
const ORGANIZATIONS_TENANT: &str = "organizations";

/// Reasons a challenge value cannot produce an authority.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ChallengeError {
	/// The value does not start with the `Bearer` scheme followed by whitespace.
	#[error("Challenge does not use the Bearer scheme.")]
	NotBearer,
	/// A parameter is not a `key=value` pair.
	#[error("Challenge parameter `{segment}` is not a key=value pair.")]
	MalformedParameter {
		/// Offending segment.
		segment: String,
	},
	/// A required parameter is absent.
	#[error("Challenge is missing the `{key}` parameter.")]
	MissingParameter {
		/// Name of the absent parameter.
		key: &'static str,
	},
	/// A parameter value is not an absolute URL.
	#[error("Challenge parameter `{key}` is not a valid URL: {value}.")]
	InvalidUrl {
		/// Name of the parameter.
		key: &'static str,
		/// Raw value.
		value: String,
	},
}

/// Authority and resource advertised by a bearer challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BearerChallenge {
	/// Normalized identity-provider authority.
	pub authority: Url,
	/// Resource identifier tokens must be issued for.
	pub resource: Url,
}

/// Parses one `WWW-Authenticate` header value.
pub fn parse(value: &str) -> Result<BearerChallenge, ChallengeError> {
	let params = bearer_parameters(value.trim())?;
	let mut authority = None;
	let mut resource = None;

	for segment in params.split(',') {
		let (key, raw) = segment
			.split_once('=')
			.ok_or_else(|| ChallengeError::MalformedParameter { segment: segment.trim().into() })?;
		let key = key.trim();
		let raw = raw.trim().trim_matches('"');

		if key.is_empty() {
			return Err(ChallengeError::MalformedParameter { segment: segment.trim().into() });
		}
		if key.eq_ignore_ascii_case(AUTHORIZATION_URI) {
			authority = Some(raw);
		} else if key.eq_ignore_ascii_case(RESOURCE_ID) {
			resource = Some(raw);
		}
	}

	let authority = authority.ok_or(ChallengeError::MissingParameter { key: AUTHORIZATION_URI })?;
	let resource = resource.ok_or(ChallengeError::MissingParameter { key: RESOURCE_ID })?;

	Ok(BearerChallenge {
		authority: normalize_authority(authority)?,
		resource: Url::parse(resource)
			.map_err(|_| ChallengeError::InvalidUrl { key: RESOURCE_ID, value: resource.into() })?,
	})
}

/// Rewrites an `authorization_uri` into an authority: drops the `oauth2/authorize` endpoint,
/// maps the `common` tenant to `organizations`, and trims the trailing slash.
pub fn normalize_authority(raw: &str) -> Result<Url, ChallengeError> {
	let invalid = || ChallengeError::InvalidUrl { key: AUTHORIZATION_URI, value: raw.into() };
	let mut url = Url::parse(raw).map_err(|_| invalid())?;

	if url.cannot_be_a_base() {
		return Err(invalid());
	}

	let stripped = url.path().replace(AUTHORIZE_SUFFIX, "");
	let path = stripped
		.split('/')
		.filter(|segment| !segment.is_empty())
		.map(|segment| {
			if segment.eq_ignore_ascii_case(COMMON_TENANT) { ORGANIZATIONS_TENANT } else { segment }
		})
		.collect::<Vec<_>>()
		.join("/");

	url.set_path(&path);
	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

fn bearer_parameters(value: &str) -> Result<&str, ChallengeError> {
	const SCHEME: &str = "bearer";

	let scheme = value.get(..SCHEME.len()).ok_or(ChallengeError::NotBearer)?;

	if !scheme.eq_ignore_ascii_case(SCHEME) {
		return Err(ChallengeError::NotBearer);
	}

	let rest = &value[SCHEME.len()..];

	if !rest.starts_with(char::is_whitespace) {
		return Err(ChallengeError::NotBearer);
	}

	Ok(rest.trim_start())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const WELL_FORMED: &str = "Bearer authorization_uri=https://login.example.test/common/oauth2/authorize, resource_id=https://org.example.test/";

	#[test]
	fn well_formed_challenge_yields_organizations_authority() {
		let challenge = parse(WELL_FORMED).expect("Well-formed challenge should parse.");

		assert_eq!(challenge.authority.as_str(), "https://login.example.test/organizations");
		assert_eq!(challenge.resource.as_str(), "https://org.example.test/");
	}

	#[test]
	fn quoted_values_and_scheme_case_are_accepted() {
		let challenge = parse(
			"  bEaReR   resource_id=\"https://org.example.test/\",authorization_uri=\"https://adfs.example.test/adfs/oauth2/authorize/\" , realm=\"x\"",
		)
		.expect("Quoted challenge should parse.");

		assert_eq!(challenge.authority.as_str(), "https://adfs.example.test/adfs");
		assert_eq!(challenge.resource.as_str(), "https://org.example.test/");
	}

	#[test]
	fn scheme_must_be_bearer_followed_by_whitespace() {
		assert_eq!(parse("BearerXXXX"), Err(ChallengeError::NotBearer));
		assert_eq!(parse("Bearer"), Err(ChallengeError::NotBearer));
		assert_eq!(parse("Bear er"), Err(ChallengeError::NotBearer));
		assert_eq!(parse("Basic realm=x"), Err(ChallengeError::NotBearer));
		assert_eq!(parse(""), Err(ChallengeError::NotBearer));
	}

	#[test]
	fn parameters_must_be_key_value_pairs() {
		assert_eq!(
			parse("Bearer authorization_uri=https://login.example.test/common, garbage"),
			Err(ChallengeError::MalformedParameter { segment: "garbage".into() })
		);
		assert_eq!(
			parse("Bearer authorization_uri=https://login.example.test/common,"),
			Err(ChallengeError::MalformedParameter { segment: String::new() })
		);
	}

	#[test]
	fn missing_parameters_are_named() {
		let err = parse("Bearer authorization_uri=https://login.example.test/common/oauth2/authorize")
			.expect_err("A challenge without resource_id should fail.");

		assert_eq!(err, ChallengeError::MissingParameter { key: "resource_id" });
		assert!(err.to_string().contains("resource_id"));
		assert_eq!(
			parse("Bearer resource_id=https://org.example.test/"),
			Err(ChallengeError::MissingParameter { key: "authorization_uri" })
		);
	}

	#[test]
	fn tenant_specific_authorities_are_kept() {
		let authority =
			normalize_authority("https://login.example.test/7f3c1e2a/oauth2/authorize?x=1")
				.expect("Tenant authority should normalize.");

		assert_eq!(authority.as_str(), "https://login.example.test/7f3c1e2a");
		assert!(normalize_authority("not a url").is_err());
	}
}
