//! Client-level error types shared by the executor, credential manager, and stores.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const BODY_EXCERPT_LIMIT: usize = 512;

/// Canonical error surfaced by every public API of the crate.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem (missing credentials, invalid options).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller input rejected before any network call.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Transport failure (connect, network, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Upstream API answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),

	/// The token exchange failed or no credentials are available.
	#[error("Authentication failed: {reason}.")]
	Authentication {
		/// Human-readable failure description.
		reason: String,
		/// HTTP status of the token endpoint, when one was received.
		status: Option<u16>,
	},
	/// Upstream rejected the call with HTTP 429.
	#[error("Upstream rate limit exceeded.")]
	RateLimited {
		/// Retry-After hint supplied by the server.
		retry_after: Option<Duration>,
	},
	/// A success response could not be parsed into the expected shape.
	#[error("Response payload is invalid: {reason}.")]
	InvalidResponse {
		/// Parsing failure description.
		reason: String,
		/// Leading slice of the offending body, when available.
		body_excerpt: Option<String>,
	},
	/// Every permitted attempt failed with a retryable error.
	#[error("Request failed after {attempts} attempt(s).")]
	RetryExhausted {
		/// Number of network attempts made.
		attempts: u32,
		/// Error returned by the final attempt.
		#[source]
		last: Box<Error>,
	},
}
impl Error {
	/// Returns `true` for failures the executor retries with backoff.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(_) | Self::RateLimited { .. } => true,
			Self::Api(api) => api.is_server_error(),
			_ => false,
		}
	}

	/// Returns `true` when the request may already have been applied upstream.
	///
	/// Timeouts, dropped connections, and 5xx answers are ambiguous; connection
	/// refusals, 429s, and 401s are not.
	pub fn is_ambiguous(&self) -> bool {
		match self {
			Self::Transport(transport) => transport.is_ambiguous(),
			Self::Api(api) => api.is_server_error(),
			_ => false,
		}
	}

	/// HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(api) => Some(api.status),
			Self::Authentication { status, .. } => *status,
			Self::RateLimited { .. } => Some(429),
			Self::RetryExhausted { last, .. } => last.status(),
			_ => None,
		}
	}

	/// Server-provided Retry-After hint, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after } => *retry_after,
			_ => None,
		}
	}

	pub(crate) fn invalid_response(reason: impl Into<String>, body: Option<&[u8]>) -> Self {
		Self::InvalidResponse { reason: reason.into(), body_excerpt: body.map(body_excerpt) }
	}
}

/// Coarse category of an [`ApiError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
	/// HTTP 4xx.
	ClientError,
	/// HTTP 5xx.
	ServerError,
	/// Any other non-success status.
	Other,
}
impl ApiErrorKind {
	/// Classifies an HTTP status code.
	pub const fn from_status(status: u16) -> Self {
		match status {
			400..=499 => Self::ClientError,
			500..=599 => Self::ServerError,
			_ => Self::Other,
		}
	}

	/// Returns a stable label suitable for logs or metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ClientError => "client_error",
			Self::ServerError => "server_error",
			Self::Other => "other",
		}
	}
}

/// Non-success answer from the TCGplayer API.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("TCGplayer API returned HTTP {status}: {message}.")]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// Message extracted from the body (`errors`, `message`, `error_description`, `error`),
	/// falling back to the canonical status reason.
	pub message: String,
	/// Leading slice of the raw body.
	pub body_excerpt: String,
}
impl ApiError {
	/// Builds an error from a raw status + body pair.
	pub fn from_response(status: u16, body: &[u8]) -> Self {
		let message = extract_message(body).unwrap_or_else(|| {
			oauth2::http::StatusCode::from_u16(status)
				.ok()
				.and_then(|code| code.canonical_reason())
				.unwrap_or("no details supplied")
				.to_owned()
		});

		Self { status, message, body_excerpt: body_excerpt(body) }
	}

	/// Client/server/other classification of [`status`](Self::status).
	pub fn kind(&self) -> ApiErrorKind {
		ApiErrorKind::from_status(self.status)
	}

	/// Returns `true` for HTTP 4xx.
	pub fn is_client_error(&self) -> bool {
		matches!(self.kind(), ApiErrorKind::ClientError)
	}

	/// Returns `true` for HTTP 5xx.
	pub fn is_server_error(&self) -> bool {
		matches!(self.kind(), ApiErrorKind::ServerError)
	}
}

/// Configuration and validation failures raised while building a client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Neither client credentials nor a bearer token were supplied.
	#[error("Either client_id + client_secret or bearer_token must be configured.")]
	MissingCredentials,
	/// Only half of the client credential pair was supplied.
	#[error("The {missing} option is required when the other client credential is set.")]
	IncompleteCredentials {
		/// Name of the missing option.
		missing: &'static str,
	},
	/// An option holds an out-of-range value.
	#[error("Option `{option}` is invalid: {reason}.")]
	InvalidOption {
		/// Option name.
		option: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// A URL option could not be parsed.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Raw value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A remote endpoint does not use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// An environment variable holds an unparsable value.
	#[error("Environment variable {var} is invalid: {reason}.")]
	InvalidEnv {
		/// Variable name.
		var: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// A request needs store context but the client was not configured for it.
	#[error("Request `{path}` requires store context, but store_context_enabled is false.")]
	StoreContextDisabled {
		/// Request path.
		path: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_option(option: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidOption { option, reason: reason.into() }
	}
}

/// Caller-input errors detected before any network call.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// The request path was empty.
	#[error("Request path must not be empty.")]
	EmptyPath,
	/// The request path is malformed.
	#[error("Request path `{path}` is invalid: {reason}.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Why it was rejected.
		reason: &'static str,
	},
	/// The HTTP method is not recognized.
	#[error("HTTP method `{method}` is invalid.")]
	InvalidMethod {
		/// Raw method.
		method: String,
	},
	/// A query parameter had an empty name.
	#[error("Query parameter names must not be empty.")]
	EmptyParameterName,
	/// A body was attached to a method that cannot carry one.
	#[error("{method} requests must not carry a body.")]
	BodyNotAllowed {
		/// HTTP method.
		method: String,
	},
	/// The idempotency key is not usable as a header value.
	#[error("Idempotency key is invalid: {reason}.")]
	InvalidIdempotencyKey {
		/// Why it was rejected.
		reason: &'static str,
	},
	/// Generic field-level rejection for endpoint helpers.
	#[error("Field `{field}` is invalid: {reason}.")]
	InvalidField {
		/// Field name.
		field: String,
		/// Why it was rejected.
		reason: String,
	},
}

/// Transport-level failures (connect, network, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The connection could not be established; the request never left the client.
	#[error("Failed to connect to the remote host.")]
	Connect {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// The exchange failed after the request may have been sent.
	#[error("Network error occurred while calling the remote host.")]
	Network {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// The exchange exceeded its timeout.
	#[error("Request timed out after {after:?}.")]
	Timeout {
		/// Timeout that elapsed.
		after: Duration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote host.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a connection-establishment failure.
	pub fn connect(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the request may have reached the server.
	pub fn is_ambiguous(&self) -> bool {
		!matches!(self, Self::Connect { .. })
	}

	/// Classifies a reqwest failure, recording `timeout` for elapsed deadlines.
	#[cfg(feature = "reqwest")]
	pub fn from_reqwest(err: ReqwestError, timeout: Duration) -> Self {
		if err.is_timeout() {
			Self::Timeout { after: timeout }
		} else if err.is_connect() {
			Self::connect(err)
		} else {
			Self::network(err)
		}
	}
}

fn extract_message(body: &[u8]) -> Option<String> {
	let value = serde_json::from_slice::<Value>(body).ok()?;
	let message = match value.get("errors") {
		Some(Value::Array(errors)) if !errors.is_empty() => errors
			.iter()
			.map(|item| match item {
				Value::String(text) => text.clone(),
				other => other.to_string(),
			})
			.collect::<Vec<_>>()
			.join("; "),
		_ => ["message", "error_description", "error"]
			.iter()
			.find_map(|field| value.get(*field).and_then(Value::as_str))
			.map(str::to_owned)?,
	};
	let trimmed = message.trim().trim_end_matches('.');

	if trimmed.is_empty() { None } else { Some(trimmed.to_owned()) }
}

fn body_excerpt(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);

	match text.char_indices().nth(BODY_EXCERPT_LIMIT) {
		Some((idx, _)) => format!("{}…", &text[..idx]),
		None => text.into_owned(),
	}
}
