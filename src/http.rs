//! Transport primitives shared by API calls and OAuth token exchanges.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack. The executor sends
//! every API call through it, and the token exchange reaches it through the `oauth2`
//! bridge in [`crate::oauth`], so a single implementation (by default
//! [`ReqwestTransport`]) carries both kinds of traffic. Implementations enforce
//! [`TransportRequest::timeout`] and report failures as [`TransportError`] so the retry
//! policy can tell connection refusals from ambiguous failures.

pub use oauth2::http;

// crates.io
use http::{HeaderMap, Method, StatusCode, header::RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Longest pause a `Retry-After` hint may impose; larger hints are clamped to it.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send + Sync>>;

/// HTTP stack abstraction used for API calls and token exchanges.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Performs one HTTP exchange, honoring `request.timeout`.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Fully resolved outbound request.
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL including the query string.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Optional body bytes.
	pub body: Option<Vec<u8>>,
	/// Deadline for the whole exchange.
	pub timeout: Duration,
}
impl TransportRequest {
	/// Creates a body-less request with empty headers.
	pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None, timeout }
	}
}

/// Raw answer produced by an [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl TransportResponse {
	/// Creates an empty response with the provided status.
	pub fn new(status: StatusCode) -> Self {
		Self { status, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Retry-After hint carried by the response, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}

	/// Status + retry metadata used for error classification.
	pub fn metadata(&self) -> ResponseMetadata {
		ResponseMetadata { status: Some(self.status.as_u16()), retry_after: self.retry_after() }
	}
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// The token exchange creates a fresh slot per request and reads it once `oauth2`
/// resolves, because `oauth2` reports endpoint errors without the HTTP status.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// [`HttpTransport`] backed by a shared [`ReqwestClient`].
///
/// Redirects should stay disabled on custom clients; TCGplayer answers token and API
/// calls directly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with the provided user agent and no redirect following.
	///
	/// `connect_timeout` bounds connection establishment on its own; the per-request
	/// [`TransportRequest::timeout`] still bounds the whole exchange.
	pub fn new(
		user_agent: &str,
		connect_timeout: Duration,
	) -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder()
			.user_agent(user_agent)
			.connect_timeout(connect_timeout)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(crate::error::ConfigError::http_client_build)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let TransportRequest { method, url, headers, body, timeout } = request;
			let mut builder = self.0.request(method, url).headers(headers).timeout(timeout);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response =
				builder.send().await.map_err(|e| TransportError::from_reqwest(e, timeout))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response
				.bytes()
				.await
				.map_err(|e| TransportError::from_reqwest(e, timeout))?
				.to_vec();

			Ok(TransportResponse { status, headers, body })
		})
	}
}

/// Parses `Retry-After` as delta-seconds or an HTTP date relative to now.
///
/// The result never exceeds [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();
	let delay = match raw.parse::<u64>() {
		Ok(secs) => Duration::from_secs(secs),
		Err(_) => {
			let delta = OffsetDateTime::parse(raw, &Rfc2822).ok()? - OffsetDateTime::now_utc();

			if !delta.is_positive() {
				return None;
			}

			Duration::try_from(delta).ok()?
		},
	};

	Some(delay.min(MAX_RETRY_AFTER))
}
