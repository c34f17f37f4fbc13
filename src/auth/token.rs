//! Bearer token model and lifecycle helpers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Lifecycle status of an [`AccessToken`] at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// The issued-at instant lies in the future.
	Pending,
	/// The token is valid.
	Active,
	/// The token reached its expiry instant.
	Expired,
}

/// Bearer token issued by the TCGplayer token endpoint (or supplied by the caller).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Issue instant.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Creates a token valid from `issued_at` until `expires_at`.
	pub fn new(
		access_token: TokenSecret,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { access_token, issued_at, expires_at }
	}

	/// Returns the wrapped secret.
	pub fn secret(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Computes the lifecycle status at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Returns `true` when the token stays valid for at least `margin` past `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		!matches!(self.status_at(instant), TokenStatus::Expired)
			&& self.remaining_at(instant) > margin
	}

	/// Remaining lifetime at `instant`, saturating at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		Duration::try_from(self.expires_at - instant).unwrap_or(Duration::ZERO)
	}

	/// `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("bearer {}", self.access_token.expose())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
