//! OAuth client-credentials exchange over the shared [`HttpTransport`].

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpRequest,
	HttpResponse, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
	error::{ApiError, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot, TransportRequest},
};

type TokenClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Performs `grant_type=client_credentials` exchanges against the token endpoint.
///
/// Credentials travel in the form body (`client_id`, `client_secret`), which is what the
/// TCGplayer token endpoint expects.
pub struct TokenExchange {
	oauth_client: TokenClient,
	token_url: Url,
	transport: Arc<dyn HttpTransport>,
	timeout: Duration,
}
impl TokenExchange {
	/// Builds an exchange bound to the provided endpoint and credentials.
	pub fn new(
		token_url: &Url,
		client_id: &str,
		client_secret: &TokenSecret,
		transport: Arc<dyn HttpTransport>,
		timeout: Duration,
	) -> Self {
		let oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_token_uri(TokenUrl::from_url(token_url.clone()))
			.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, token_url: token_url.clone(), transport, timeout }
	}

	/// Exchanges the client credentials for a bearer token issued at `issued_at`.
	pub async fn exchange(&self, issued_at: OffsetDateTime) -> Result<AccessToken> {
		let slot = ResponseMetadataSlot::default();
		let handle = TransportHandle {
			transport: Arc::clone(&self.transport),
			timeout: self.timeout,
			slot: slot.clone(),
		};
		let response = self
			.oauth_client
			.exchange_client_credentials()
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(slot.take(), err))?;

		map_token_response(response, issued_at)
	}
}
impl Debug for TokenExchange {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchange")
			.field("token_url", &self.token_url.as_str())
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

/// [`AsyncHttpClient`] adapter that routes `oauth2` requests through an [`HttpTransport`]
/// and records response metadata for error classification.
struct TransportHandle {
	transport: Arc<dyn HttpTransport>,
	timeout: Duration,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for TransportHandle {
	type Error = TransportError;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let (parts, body) = request.into_parts();
			let url = Url::parse(&parts.uri.to_string()).map_err(TransportError::connect)?;
			let mut outbound = TransportRequest::new(parts.method, url, self.timeout);

			outbound.headers = parts.headers;
			outbound.body = Some(body);

			let response = self.transport.send(outbound).await?;

			self.slot.store(response.metadata());

			let mut converted = HttpResponse::new(response.body);

			*converted.status_mut() = response.status;
			*converted.headers_mut() = response.headers;

			Ok(converted)
		})
	}
}

fn map_token_response(
	response: BasicTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<AccessToken> {
	let access_token = response.access_token().secret();

	if access_token.trim().is_empty() {
		return Err(authentication("token payload carries an empty access_token", Some(200)));
	}

	let expires_in = response
		.expires_in()
		.filter(|lifetime| !lifetime.is_zero())
		.ok_or_else(|| authentication("token payload lacks a positive expires_in", Some(200)))?;

	let expires_at = time::Duration::try_from(expires_in)
		.ok()
		.and_then(|lifetime| issued_at.checked_add(lifetime))
		.ok_or_else(|| {
			authentication("token payload carries an out-of-range expires_in", Some(200))
		})?;
	let secret = TokenSecret::new(access_token.as_str());

	Ok(AccessToken::new(secret, issued_at, expires_at))
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<TransportError>,
) -> Error {
	match err {
		RequestTokenError::Request(inner) => inner.into(),
		RequestTokenError::ServerResponse(response) => {
			let reason = match response.error_description() {
				Some(description) =>
					format!("token endpoint rejected the credentials: {description}"),
				None => format!(
					"token endpoint rejected the credentials: {}",
					response.error().as_ref()
				),
			};

			classify_endpoint_failure(meta, reason, &[])
		},
		RequestTokenError::Parse(source, body) => classify_endpoint_failure(
			meta,
			format!("token payload is malformed at `{}`", source.path()),
			&body,
		),
		RequestTokenError::Other(message) =>
			classify_endpoint_failure(meta, format!("token endpoint failed: {message}"), &[]),
	}
}

fn classify_endpoint_failure(
	meta: Option<ResponseMetadata>,
	reason: String,
	body: &[u8],
) -> Error {
	let ResponseMetadata { status, retry_after } = meta.unwrap_or_default();

	match status {
		Some(429) => Error::RateLimited { retry_after },
		Some(code @ 500..=599) => ApiError::from_response(code, body).into(),
		_ => Error::Authentication { reason, status },
	}
}

fn authentication(reason: &str, status: Option<u16>) -> Error {
	Error::Authentication { reason: reason.into(), status }
}
