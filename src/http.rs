//! HTTP contract for key activation.
//!
//! [`ActivationResponse::from_outcome`] turns a [`ClaimOutcome`] into the status code and JSON
//! body expected by clients of `GET /activate-key`:
//!
//! | outcome | status | body |
//! |---|---|---|
//! | granted | 200 | `{"success":true,"key":"..."}` |
//! | rate limited | 429 | `{"success":false,"message":"..."}` |
//! | pool exhausted | configurable, 404 by default | `{"success":false,"message":"..."}` |
//! | store failure | 503 | `{"success":false,"message":"..."}` |
//!
//! With the `axum` feature, [`router`] mounts that contract on a ready-made route keyed by the
//! peer address. Serve it with `into_make_service_with_connect_info::<SocketAddr>()`.

// self
use crate::{
	_prelude::*,
	dispenser::{ClaimOutcome, DenialReason},
};

/// Route served by [`router`].
pub const ACTIVATE_KEY_PATH: &str = "/activate-key";

/// JSON body of an activation response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationBody {
	/// Whether a key was granted.
	pub success: bool,
	/// The granted key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	/// Explanation for a refusal.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Status, body, and retry hint for one claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationResponse {
	/// HTTP status code.
	pub status: u16,
	/// JSON body.
	pub body: ActivationBody,
	/// Seconds until a rate-limited client may retry, rounded up.
	pub retry_after_secs: Option<u64>,
}
impl ActivationResponse {
	/// Maps `outcome`, observed at `now`, onto the wire contract.
	pub fn from_outcome(outcome: &ClaimOutcome, now: OffsetDateTime, exhausted_status: u16) -> Self {
		match outcome {
			ClaimOutcome::Granted(key) => Self {
				status: 200,
				body: ActivationBody {
					success: true,
					key: Some(key.expose().to_owned()),
					message: None,
				},
				retry_after_secs: None,
			},
			ClaimOutcome::Denied(denial) => {
				let status = match denial.reason {
					DenialReason::RateLimited => 429,
					DenialReason::NoKeys => exhausted_status,
					DenialReason::Unavailable => 503,
				};

				Self {
					status,
					body: ActivationBody {
						success: false,
						key: None,
						message: Some(denial.message.clone()),
					},
					retry_after_secs: denial.retry_at.map(|at| ceil_secs(at - now)),
				}
			},
		}
	}

	/// Serializes the body as JSON.
	pub fn body_json(&self) -> String {
		serde_json::to_string(&self.body).unwrap_or_else(|_| String::from("{\"success\":false}"))
	}
}

fn ceil_secs(span: Duration) -> u64 {
	if span <= Duration::ZERO {
		return 0;
	}

	let secs = span.whole_seconds() as u64;

	if span.subsec_nanoseconds() > 0 { secs + 1 } else { secs }
}

#[cfg(feature = "axum")]
mod route {
	// std
	use std::net::SocketAddr;
	// crates.io
	use axum::{
		Json, Router,
		extract::{ConnectInfo, State},
		http::{HeaderValue, StatusCode, header},
		response::{IntoResponse, Response},
		routing::get,
	};
	// self
	use super::{ACTIVATE_KEY_PATH, ActivationResponse};
	use crate::{_prelude::*, dispenser::KeyDispenser, key::ClientId};

	#[derive(Debug)]
	struct RouteState {
		dispenser: KeyDispenser,
		exhausted_status: u16,
	}

	impl IntoResponse for ActivationResponse {
		fn into_response(self) -> Response {
			let status =
				StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
			let mut response = (status, Json(self.body)).into_response();

			if let Some(secs) = self.retry_after_secs {
				response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
			}

			response
		}
	}

	async fn activate_key(
		State(state): State<Arc<RouteState>>,
		ConnectInfo(peer): ConnectInfo<SocketAddr>,
	) -> ActivationResponse {
		let client = ClientId::from(peer.ip());
		let outcome = state.dispenser.claim(&client).await;

		ActivationResponse::from_outcome(
			&outcome,
			state.dispenser.clock.now_utc(),
			state.exhausted_status,
		)
	}

	/// Builds a router serving [`ACTIVATE_KEY_PATH`] from `dispenser`.
	///
	/// Merge it into the host application's router; everything else stays with the host.
	pub fn router(dispenser: KeyDispenser, exhausted_status: u16) -> Router {
		let state = Arc::new(RouteState { dispenser, exhausted_status });

		Router::new().route(ACTIVATE_KEY_PATH, get(activate_key)).with_state(state)
	}
}
#[cfg(feature = "axum")] pub use route::router;

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{dispenser::Denial, key::ActivationKey};

	const NOW: OffsetDateTime = macros::datetime!(2025-06-01 00:00 UTC);

	fn denied(reason: DenialReason, retry_at: Option<OffsetDateTime>) -> ClaimOutcome {
		ClaimOutcome::Denied(Denial { reason, message: "nope".into(), retry_at })
	}

	#[test]
	fn granted_claims_carry_the_key() {
		let key = ActivationKey::parse("abc_DEF-123").expect("Key fixture should parse.");
		let response = ActivationResponse::from_outcome(&ClaimOutcome::Granted(key), NOW, 404);

		assert_eq!(response.status, 200);
		assert_eq!(response.body_json(), r#"{"success":true,"key":"abc_DEF-123"}"#);
		assert_eq!(response.retry_after_secs, None);
	}

	#[test]
	fn denials_map_to_status_codes() {
		let limited = ActivationResponse::from_outcome(
			&denied(DenialReason::RateLimited, Some(NOW + Duration::milliseconds(1_500))),
			NOW,
			404,
		);

		assert_eq!(limited.status, 429);
		assert_eq!(limited.retry_after_secs, Some(2));
		assert_eq!(limited.body_json(), r#"{"success":false,"message":"nope"}"#);

		assert_eq!(
			ActivationResponse::from_outcome(&denied(DenialReason::NoKeys, None), NOW, 404).status,
			404
		);
		assert_eq!(
			ActivationResponse::from_outcome(&denied(DenialReason::NoKeys, None), NOW, 429).status,
			429
		);
		assert_eq!(
			ActivationResponse::from_outcome(&denied(DenialReason::Unavailable, None), NOW, 404)
				.status,
			503
		);
	}

	#[test]
	fn elapsed_retry_instants_clamp_to_zero() {
		assert_eq!(ceil_secs(Duration::seconds(-5)), 0);
		assert_eq!(ceil_secs(Duration::seconds(30)), 30);
	}
}
