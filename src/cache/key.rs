//! Canonical cache keys derived from (method, path, query, body).

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use url::form_urlencoded;
// self
use crate::_prelude::*;

/// Deterministic identity of a cacheable request.
///
/// Rendered as `METHOD path?query#fingerprint`, where the query part is omitted when there
/// are no parameters and the fingerprint part when there is no body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	method: String,
	path: String,
	query: String,
	fingerprint: Option<String>,
}
impl CacheKey {
	/// Derives the canonical key.
	///
	/// The method is upper-cased, the path normalized with [`normalize_path`], parameters
	/// sorted by name then value before form encoding, and the body fingerprinted as the
	/// SHA-256 of its JSON serialization (object keys sorted).
	pub fn new(
		method: &str,
		path: &str,
		params: &[(String, String)],
		body: Option<&Value>,
	) -> Self {
		let mut sorted = params.iter().collect::<Vec<_>>();

		sorted.sort();

		let query = form_urlencoded::Serializer::new(String::new())
			.extend_pairs(sorted.iter().map(|(name, value)| (name.as_str(), value.as_str())))
			.finish();

		Self {
			method: method.trim().to_ascii_uppercase(),
			path: normalize_path(path),
			query,
			fingerprint: body.map(fingerprint),
		}
	}

	/// Upper-cased HTTP method.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// Normalized path.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Form-encoded, sorted query string.
	pub fn query(&self) -> &str {
		&self.query
	}

	/// Returns `true` if the key's path equals `prefix` or lies beneath it.
	pub fn is_under(&self, prefix: &str) -> bool {
		let prefix = normalize_path(prefix);

		prefix == "/"
			|| self.path == prefix
			|| self.path.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} {}", self.method, self.path)?;

		if !self.query.is_empty() {
			write!(f, "?{}", self.query)?;
		}
		if let Some(fingerprint) = &self.fingerprint {
			write!(f, "#{fingerprint}")?;
		}

		Ok(())
	}
}

/// Trims whitespace, forces a single leading `/`, collapses duplicate slashes, and drops
/// the trailing slash. An empty path normalizes to `/`.
pub fn normalize_path(path: &str) -> String {
	let segments =
		path.trim().split('/').filter(|segment| !segment.is_empty()).collect::<Vec<_>>();

	format!("/{}", segments.join("/"))
}

fn fingerprint(body: &Value) -> String {
	let digest = Sha256::digest(body.to_string().as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs.iter().map(|(name, value)| ((*name).to_owned(), (*value).to_owned())).collect()
	}

	#[test]
	fn paths_normalize_to_one_form() {
		assert_eq!(normalize_path(" catalog//categories/ "), "/catalog/categories");
		assert_eq!(normalize_path("/catalog/categories"), "/catalog/categories");
		assert_eq!(normalize_path(""), "/");
		assert_eq!(normalize_path("///"), "/");
	}

	#[test]
	fn equivalent_requests_share_a_key() {
		let a = CacheKey::new(
			"get",
			"catalog/products/",
			&params(&[("limit", "10"), ("categoryId", "1")]),
			None,
		);
		let b = CacheKey::new(
			"GET",
			"/catalog//products",
			&params(&[("categoryId", "1"), ("limit", "10")]),
			None,
		);

		assert_eq!(a, b);
		assert_eq!(a.to_string(), "GET /catalog/products?categoryId=1&limit=10");
	}

	#[test]
	fn bodies_are_fingerprinted_independent_of_key_order() {
		let first: Value = serde_json::from_str(r#"{"b":2,"a":[1,2]}"#)
			.expect("First body fixture should parse.");
		let second: Value = serde_json::from_str(r#"{"a":[1,2],"b":2}"#)
			.expect("Second body fixture should parse.");
		let other: Value =
			serde_json::from_str(r#"{"a":[2,1],"b":2}"#).expect("Third body fixture should parse.");
		let a = CacheKey::new("POST", "/pricing/sku", &[], Some(&first));
		let b = CacheKey::new("POST", "/pricing/sku", &[], Some(&second));
		let c = CacheKey::new("POST", "/pricing/sku", &[], Some(&other));

		assert_eq!(a, b);
		assert_ne!(a, c);
		assert!(a.to_string().starts_with("POST /pricing/sku#"));
		assert!(!a.to_string().contains('='));
	}

	#[test]
	fn query_values_are_form_encoded() {
		let params = params(&[("name", "Black Lotus & Co")]);
		let key = CacheKey::new("GET", "/catalog/products", &params, None);

		assert_eq!(key.query(), "name=Black+Lotus+%26+Co");
	}

	#[test]
	fn prefix_matching_respects_segment_boundaries() {
		let key = CacheKey::new("GET", "/stores/abc/inventory", &[], None);

		assert!(key.is_under("/stores"));
		assert!(key.is_under("stores/abc/"));
		assert!(key.is_under("/stores/abc/inventory"));
		assert!(key.is_under("/"));
		assert!(!key.is_under("/stores/ab"));
		assert!(!key.is_under("/catalog"));
	}
}
