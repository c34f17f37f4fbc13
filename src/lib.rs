//! TCGplayer API client core: OAuth client-credentials lifecycle, sliding-window admission
//! control, classified retries with backoff, and an LRU response cache behind one
//! [`Client::execute`] call.
//!
//! Endpoint helpers live outside this crate; they build a [`RequestDescriptor`] (or call
//! [`Client::request`]) and receive either parsed JSON or exactly one typed [`Error`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod runtime;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and in-process fakes for integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		config::ClientConfig,
		error::TransportError,
		executor::Client,
		http::{
			HttpTransport, TransportFuture, TransportRequest, TransportResponse,
			http::{HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
		},
		runtime::ManualClock,
	};

	/// Canned reply served by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// HTTP response with the given status, headers, and body.
		Response {
			/// HTTP status code.
			status: u16,
			/// Extra response headers.
			headers: Vec<(&'static str, String)>,
			/// Raw body bytes.
			body: String,
		},
		/// The request exceeded its timeout.
		Timeout,
		/// The connection could not be established.
		ConnectionRefused,
		/// The connection dropped after the request was sent.
		ConnectionReset,
	}
	impl ScriptedReply {
		/// JSON response with the provided status.
		pub fn json(status: u16, body: impl Into<String>) -> Self {
			Self::Response {
				status,
				headers: vec![("content-type", "application/json".into())],
				body: body.into(),
			}
		}

		/// Response without a JSON content type.
		pub fn text(status: u16, body: impl Into<String>) -> Self {
			Self::Response {
				status,
				headers: vec![("content-type", "text/html".into())],
				body: body.into(),
			}
		}

		/// Successful token endpoint payload.
		pub fn token(access_token: &str, expires_in: u64) -> Self {
			Self::json(
				200,
				format!(
					"{{\"access_token\":\"{access_token}\",\"token_type\":\"bearer\",\"expires_in\":{expires_in}}}"
				),
			)
		}

		/// Adds a response header; no-op for transport failures.
		pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
			if let Self::Response { headers, .. } = &mut self {
				headers.push((name, value.into()));
			}

			self
		}
	}

	#[derive(Debug, Default)]
	struct Route {
		path: String,
		queued: VecDeque<ScriptedReply>,
		fallback: Option<ScriptedReply>,
	}

	/// In-process [`HttpTransport`] that serves scripted replies per URL path and records
	/// every request it receives.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		routes: Mutex<Vec<Route>>,
		requests: Mutex<Vec<TransportRequest>>,
		delay: Mutex<Option<Duration>>,
	}
	impl ScriptedTransport {
		/// Creates an empty transport behind an [`Arc`].
		pub fn new() -> Arc<Self> {
			Arc::new(Self::default())
		}

		/// Queues a one-shot reply for requests whose URL path ends with `path`.
		pub fn respond(&self, path: &str, reply: ScriptedReply) -> &Self {
			self.with_route(path, |route| route.queued.push_back(reply));

			self
		}

		/// Sets the reply served once the one-shot queue for `path` is drained.
		pub fn always(&self, path: &str, reply: ScriptedReply) -> &Self {
			self.with_route(path, |route| route.fallback = Some(reply));

			self
		}

		/// Delays every reply, keeping requests in flight long enough to overlap.
		pub fn delay_replies(&self, delay: Duration) -> &Self {
			*self.delay.lock() = Some(delay);

			self
		}

		/// Returns every recorded request.
		pub fn requests(&self) -> Vec<TransportRequest> {
			self.requests.lock().clone()
		}

		/// Counts recorded requests whose URL path ends with `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.requests.lock().iter().filter(|request| request.url.path().ends_with(path)).count()
		}

		fn with_route(&self, path: &str, apply: impl FnOnce(&mut Route)) {
			let mut routes = self.routes.lock();

			match routes.iter_mut().find(|route| route.path == path) {
				Some(route) => apply(route),
				None => {
					let mut route = Route { path: path.to_owned(), ..Route::default() };

					apply(&mut route);
					routes.push(route);
				},
			}
		}

		fn next_reply(&self, request: &TransportRequest) -> Option<ScriptedReply> {
			let mut routes = self.routes.lock();
			let route = routes
				.iter_mut()
				.filter(|route| request.url.path().ends_with(route.path.as_str()))
				.max_by_key(|route| route.path.len())?;

			route.queued.pop_front().or_else(|| route.fallback.clone())
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let delay = *self.delay.lock();

				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}

				let reply = self.next_reply(&request);
				let timeout = request.timeout;

				self.requests.lock().push(request);

				match reply {
					Some(ScriptedReply::Response { status, headers, body }) => {
						let status = StatusCode::from_u16(status)
							.expect("Scripted replies must use valid HTTP status codes.");
						let mut response = TransportResponse::new(status).with_body(body);

						for (name, value) in headers {
							response.headers.insert(
								HeaderName::from_static(name),
								HeaderValue::from_str(&value)
									.expect("Scripted header values must be valid."),
							);
						}

						Ok(response)
					},
					Some(ScriptedReply::Timeout) => Err(TransportError::Timeout { after: timeout }),
					Some(ScriptedReply::ConnectionRefused) =>
						Err(TransportError::connect(std::io::Error::from(
							std::io::ErrorKind::ConnectionRefused,
						))),
					Some(ScriptedReply::ConnectionReset) => Err(TransportError::network(
						std::io::Error::from(std::io::ErrorKind::ConnectionReset),
					)),
					None => {
						let mut response = TransportResponse::new(StatusCode::NOT_FOUND)
							.with_body("{\"errors\":[\"No scripted reply.\"]}");

						response
							.headers
							.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

						Ok(response)
					},
				}
			})
		}
	}

	/// Configuration pointing at `base` with test credentials and fast backoff.
	pub fn test_config(base: &str) -> ClientConfig {
		let base_url = Url::parse(base).expect("Test base URL should parse.");
		let token_url = base_url.join("token").expect("Test token URL should join.");

		ClientConfig::default()
			.with_base_url(base_url)
			.with_token_url(token_url)
			.with_client_credentials("test-client", "test-secret")
			.with_backoff(Duration::from_millis(100), Duration::from_secs(5))
	}

	/// Builds a client over `transport` whose clock and sleeper are the provided manual clock.
	pub fn scripted_client(
		config: ClientConfig,
		transport: Arc<ScriptedTransport>,
		clock: &ManualClock,
	) -> Client {
		Client::builder(config)
			.transport(transport)
			.clock(Arc::new(clock.clone()))
			.sleeper(Arc::new(clock.clone()))
			.build()
			.expect("Scripted client should build.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{
			Arc,
			atomic::{AtomicU64, Ordering},
		},
		time::{Duration, Instant},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use config::ClientConfig;
pub use error::{ApiError, Error, Result};
pub use executor::{Client, ClientBuilder};
pub use request::{CachePolicy, RequestDescriptor};
#[cfg(feature = "reqwest")] pub use reqwest;
pub use serde_json;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
