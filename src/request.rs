//! Request descriptors handed to the executor by endpoint helpers.

// self
use crate::{
	_prelude::*,
	cache::{CacheKey, normalize_path},
	error::ValidationError,
	http::http::{HeaderValue, Method},
};

const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

/// How a read-only request interacts with the response cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
	/// Cache with the client's default TTL.
	#[default]
	Default,
	/// Cache with an explicit TTL.
	Ttl(Duration),
	/// Neither read from nor write to the cache.
	Bypass,
}

/// One API call: method, path, parameters, body, and execution hints.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API root.
	pub path: String,
	/// Query parameters in insertion order.
	pub query_params: Vec<(String, String)>,
	/// Optional JSON body.
	pub body: Option<Value>,
	/// Whether the call needs store (seller) context.
	pub requires_store_context: bool,
	/// Sent as `Idempotency-Key`; makes writes safe to retry after ambiguous failures.
	pub idempotency_key: Option<String>,
	/// Cache interaction for read-only calls.
	pub cache_policy: CachePolicy,
	/// Path prefixes whose cached reads a successful write makes stale.
	pub invalidates: Vec<String>,
}
impl RequestDescriptor {
	/// Creates a descriptor with no parameters, body, or hints.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query_params: Vec::new(),
			body: None,
			requires_store_context: false,
			idempotency_key: None,
			cache_policy: CachePolicy::Default,
			invalidates: Vec::new(),
		}
	}

	/// `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` descriptor.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends one query parameter.
	pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.query_params.push((name.into(), value.to_string()));

		self
	}

	/// Appends several query parameters.
	pub fn params<I, K, V>(mut self, params: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: ToString,
	{
		self.query_params.extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));

		self
	}

	/// Sets the JSON body.
	pub fn json(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Marks the call as requiring store context.
	pub fn store_context(mut self) -> Self {
		self.requires_store_context = true;

		self
	}

	/// Attaches an idempotency key.
	pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
		self.idempotency_key = Some(key.into());

		self
	}

	/// Caches the response for `ttl` instead of the default TTL.
	pub fn cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_policy = CachePolicy::Ttl(ttl);

		self
	}

	/// Skips the cache entirely.
	pub fn no_cache(mut self) -> Self {
		self.cache_policy = CachePolicy::Bypass;

		self
	}

	/// Registers a path prefix whose cached reads become stale once this write succeeds.
	pub fn invalidates(mut self, prefix: impl Into<String>) -> Self {
		self.invalidates.push(prefix.into());

		self
	}

	/// Returns `true` for `GET` and `HEAD`; every other method is treated as a write.
	pub fn is_read_only(&self) -> bool {
		matches!(self.method, Method::GET | Method::HEAD)
	}

	/// Returns `true` when the response may be served from or stored in the cache.
	pub fn is_cacheable(&self) -> bool {
		self.is_read_only() && !matches!(self.cache_policy, CachePolicy::Bypass)
	}

	/// Normalized form of [`path`](Self::path).
	pub fn normalized_path(&self) -> String {
		normalize_path(&self.path)
	}

	/// Canonical cache key.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey::new(self.method.as_str(), &self.path, &self.query_params, self.body.as_ref())
	}

	/// Rejects malformed input before any network call.
	pub fn validate(&self) -> Result<(), ValidationError> {
		let path = self.path.trim();

		if path.is_empty() {
			return Err(ValidationError::EmptyPath);
		}
		if path.contains("://") {
			return Err(self.invalid_path("must be relative to the API root"));
		}
		if path.contains(['?', '#']) {
			return Err(self.invalid_path("query parameters belong in query_params"));
		}
		if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
			return Err(self.invalid_path("must not contain whitespace or control characters"));
		}
		if path.split('/').any(|segment| segment == "..") {
			return Err(self.invalid_path("must not contain `..` segments"));
		}
		if self.query_params.iter().any(|(name, _)| name.trim().is_empty()) {
			return Err(ValidationError::EmptyParameterName);
		}
		if self.body.is_some() && self.is_read_only() {
			return Err(ValidationError::BodyNotAllowed { method: self.method.to_string() });
		}
		if let Some(key) = &self.idempotency_key {
			validate_idempotency_key(key)?;
		}

		Ok(())
	}

	fn invalid_path(&self, reason: &'static str) -> ValidationError {
		ValidationError::InvalidPath { path: self.path.clone(), reason }
	}
}

/// Parses a caller-supplied method name, upper-casing it first.
pub fn parse_method(method: &str) -> Result<Method, ValidationError> {
	let upper = method.trim().to_ascii_uppercase();

	if upper.is_empty() {
		return Err(ValidationError::InvalidMethod { method: method.to_owned() });
	}

	Method::from_bytes(upper.as_bytes())
		.map_err(|_| ValidationError::InvalidMethod { method: method.to_owned() })
}

fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
	if key.trim().is_empty() {
		return Err(ValidationError::InvalidIdempotencyKey { reason: "must not be empty" });
	}
	if key.len() > IDEMPOTENCY_KEY_MAX_LEN {
		return Err(ValidationError::InvalidIdempotencyKey {
			reason: "must be at most 255 characters",
		});
	}
	if HeaderValue::from_str(key).is_err() || !key.is_ascii() {
		return Err(ValidationError::InvalidIdempotencyKey {
			reason: "must be visible ASCII usable as a header value",
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn builders_collect_parameters_and_hints() {
		let descriptor = RequestDescriptor::get("/catalog/products")
			.query("categoryId", 1)
			.params([("limit", 10), ("offset", 0)])
			.cache_ttl(Duration::from_secs(5));

		assert_eq!(descriptor.query_params.len(), 3);
		assert_eq!(descriptor.query_params[0], ("categoryId".into(), "1".into()));
		assert_eq!(descriptor.cache_policy, CachePolicy::Ttl(Duration::from_secs(5)));
		assert!(descriptor.is_cacheable());
		assert!(descriptor.validate().is_ok());
		assert!(!RequestDescriptor::get("/a").no_cache().is_cacheable());
		assert!(!RequestDescriptor::post("/a").is_cacheable());
	}

	#[test]
	fn validation_rejects_malformed_input() {
		assert_eq!(RequestDescriptor::get("  ").validate(), Err(ValidationError::EmptyPath));
		assert!(matches!(
			RequestDescriptor::get("/catalog?limit=1").validate(),
			Err(ValidationError::InvalidPath { .. })
		));
		assert!(matches!(
			RequestDescriptor::get("https://evil.example/x").validate(),
			Err(ValidationError::InvalidPath { .. })
		));
		assert!(matches!(
			RequestDescriptor::get("/stores/../admin").validate(),
			Err(ValidationError::InvalidPath { .. })
		));
		assert_eq!(
			RequestDescriptor::get("/catalog").query(" ", 1).validate(),
			Err(ValidationError::EmptyParameterName)
		);
		assert_eq!(
			RequestDescriptor::get("/catalog").json(json!({"a": 1})).validate(),
			Err(ValidationError::BodyNotAllowed { method: "GET".into() })
		);
		assert!(matches!(
			RequestDescriptor::post("/stores/x/orders").idempotency_key("bad\nkey").validate(),
			Err(ValidationError::InvalidIdempotencyKey { .. })
		));
		assert!(matches!(
			RequestDescriptor::post("/stores/x/orders").idempotency_key("").validate(),
			Err(ValidationError::InvalidIdempotencyKey { .. })
		));
	}

	#[test]
	fn methods_parse_case_insensitively() {
		assert_eq!(parse_method("get"), Ok(Method::GET));
		assert_eq!(parse_method(" Post "), Ok(Method::POST));
		assert!(matches!(parse_method(""), Err(ValidationError::InvalidMethod { .. })));
		assert!(matches!(parse_method("GE T"), Err(ValidationError::InvalidMethod { .. })));
	}

	#[test]
	fn cache_key_ignores_parameter_order() {
		let a = RequestDescriptor::get("/catalog/products").query("b", 2).query("a", 1);
		let b = RequestDescriptor::get("catalog/products/").query("a", 1).query("b", 2);

		assert_eq!(a.cache_key(), b.cache_key());
		assert_eq!(a.normalized_path(), "/catalog/products");
	}
}
