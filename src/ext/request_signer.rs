//! Attaches acquired tokens to outbound requests.

// crates.io
use reqwest::{RequestBuilder, header::AUTHORIZATION};
// self
use crate::{_prelude::*, error::TransientError, orchestrator::AcquiredToken};

/// Attaches an [`AcquiredToken`] to an outbound request without constraining the HTTP client
/// type.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the request and injects the token's authorization state.
	fn attach_token(&self, request: Request, token: &AcquiredToken) -> Result<Request, Error>;
}

/// Sets `Authorization: Bearer <token>` on reqwest requests, refusing expired tokens.
///
/// Expired tokens fail with [`TransientError::TokenExpired`]; call
/// [`AcquiredToken::refresh_silently`] and sign again.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
impl RequestSignerExt<RequestBuilder, Error> for BearerSigner {
	fn attach_token(
		&self,
		request: RequestBuilder,
		token: &AcquiredToken,
	) -> Result<RequestBuilder, Error> {
		if token.is_expired_at(OffsetDateTime::now_utc()) {
			return Err(TransientError::TokenExpired {
				resource: token.resource.to_string(),
				expires_at: token.expires_at,
			}
			.into());
		}

		Ok(request.header(AUTHORIZATION, token.access_token.bearer_header()))
	}
}
