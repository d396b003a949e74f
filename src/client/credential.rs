//! Confidential-client credentials.

// std
use std::fs;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pem::Pem;
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, TokenSecret},
	error::ConfigError,
	oauth::JWT_BEARER_ASSERTION_TYPE,
};

const ASSERTION_LIFETIME: Duration = Duration::minutes(10);
const JTI_LEN: usize = 32;

/// Credential a confidential client authenticates with.
#[derive(Clone, Debug)]
pub enum ClientCredential {
	/// X.509 certificate; the client signs a JWT assertion with its private key.
	Certificate(ClientCertificate),
	/// Shared client secret.
	Secret(TokenSecret),
	/// Federated workload-identity token read from a file on every acquisition.
	FederatedTokenFile(PathBuf),
}
impl ClientCredential {
	/// Short label used in logs.
	pub fn label(&self) -> &'static str {
		match self {
			ClientCredential::Certificate(_) => "certificate",
			ClientCredential::Secret(_) => "secret",
			ClientCredential::FederatedTokenFile(_) => "federated_token",
		}
	}

	/// Form parameters proving the client's identity for a token request to `token_url`.
	///
	/// Secrets are handled by the `oauth2` client itself and yield no extra parameters.
	pub fn assertion_params(
		&self,
		client_id: &ClientId,
		token_url: &Url,
	) -> Result<Vec<(String, String)>, ConfigError> {
		let assertion = match self {
			ClientCredential::Secret(_) => return Ok(Vec::new()),
			ClientCredential::Certificate(certificate) =>
				certificate.assertion(client_id, token_url)?,
			ClientCredential::FederatedTokenFile(path) => read_federated_token(path)?,
		};

		Ok(vec![
			("client_assertion_type".into(), JWT_BEARER_ASSERTION_TYPE.into()),
			("client_assertion".into(), assertion),
		])
	}

	/// Stable identity of the credential material, used to tell clients bound to different
	/// credentials apart. Secrets are hashed; the value never contains secret material.
	pub fn fingerprint(&self) -> String {
		match self {
			ClientCredential::Certificate(certificate) =>
				format!("certificate:{}", certificate.thumbprint()),
			ClientCredential::Secret(secret) =>
				format!("secret:{}", thumbprint(secret.expose().as_bytes())),
			ClientCredential::FederatedTokenFile(path) =>
				format!("federated_token:{}", path.display()),
		}
	}

	/// Client secret, when this credential is one.
	pub fn secret(&self) -> Option<&TokenSecret> {
		match self {
			ClientCredential::Secret(secret) => Some(secret),
			_ => None,
		}
	}
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
	aud: &'a str,
	iss: &'a str,
	sub: &'a str,
	jti: String,
	nbf: i64,
	iat: i64,
	exp: i64,
}

/// Certificate and RSA private key used to sign client assertions.
#[derive(Clone)]
pub struct ClientCertificate {
	key: EncodingKey,
	thumbprint: String,
}
impl ClientCertificate {
	/// Parses a PEM bundle holding a `CERTIFICATE` block and an RSA private key block.
	pub fn from_pem(bundle: &str) -> Result<Self, ConfigError> {
		let blocks = pem::parse_many(bundle)
			.map_err(|e| ConfigError::InvalidCertificate { reason: e.to_string() })?;
		let certificate = blocks
			.iter()
			.find(|block| block.tag() == "CERTIFICATE")
			.ok_or_else(|| ConfigError::InvalidCertificate { reason: "no CERTIFICATE block".into() })?;
		let private_key = blocks
			.iter()
			.find(|block| block.tag().ends_with("PRIVATE KEY"))
			.ok_or_else(|| ConfigError::InvalidCertificate { reason: "no private key block".into() })?;
		let key_pem = pem::encode(&Pem::new(private_key.tag(), private_key.contents()));
		let key = EncodingKey::from_rsa_pem(key_pem.as_bytes())
			.map_err(|e| ConfigError::InvalidCertificate { reason: e.to_string() })?;

		Ok(Self { key, thumbprint: thumbprint(certificate.contents()) })
	}

	/// Reads a PEM bundle from disk.
	pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let bundle = fs::read_to_string(path).map_err(|e| ConfigError::InvalidCertificate {
			reason: format!("failed to read {}: {e}", path.display()),
		})?;

		Self::from_pem(&bundle)
	}

	/// Base64url SHA-256 thumbprint of the DER certificate (`x5t#S256`).
	pub fn thumbprint(&self) -> &str {
		&self.thumbprint
	}

	/// Signs an RS256 client assertion for `audience`, valid for ten minutes.
	pub fn assertion(&self, client_id: &ClientId, audience: &Url) -> Result<String, ConfigError> {
		let mut header = Header::new(Algorithm::RS256);

		header.x5t_s256 = Some(self.thumbprint.clone());

		let now = OffsetDateTime::now_utc().unix_timestamp();
		let claims = AssertionClaims {
			aud: audience.as_str(),
			iss: client_id.as_ref(),
			sub: client_id.as_ref(),
			jti: rand::rng().sample_iter(Alphanumeric).take(JTI_LEN).map(char::from).collect(),
			nbf: now,
			iat: now,
			exp: now + ASSERTION_LIFETIME.whole_seconds(),
		};

		Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
	}
}
impl Debug for ClientCertificate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCertificate").field("thumbprint", &self.thumbprint).finish()
	}
}

fn thumbprint(der: &[u8]) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(der))
}

fn read_federated_token(path: &Path) -> Result<String, ConfigError> {
	let token = fs::read_to_string(path)
		.map_err(|source| ConfigError::FederatedToken { path: path.to_owned(), source })?;

	Ok(token.trim().to_owned())
}
