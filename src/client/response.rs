//! Response interpretation: strict JSON content type, lenient body parsing.

// crates.io
use oauth2::{
	HttpResponse,
	http::{HeaderMap, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::_prelude::*;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Parsed response payload.
#[derive(Debug)]
pub enum ResponseBody {
	/// Well-formed JSON document.
	Json(Value),
	/// No payload.
	Empty,
	/// JSON content type, but the payload did not parse. The raw bytes are preserved.
	Malformed {
		/// Untouched payload.
		raw: Vec<u8>,
		/// Parse failure.
		error: serde_json::Error,
	},
}
impl ResponseBody {
	fn from_bytes(raw: Vec<u8>) -> Self {
		if raw.iter().all(u8::is_ascii_whitespace) {
			return Self::Empty;
		}

		match serde_json::from_slice(&raw) {
			Ok(value) => Self::Json(value),
			Err(error) => Self::Malformed { raw, error },
		}
	}
}

/// Response returned by [`ApiClient`](crate::client::ApiClient).
#[derive(Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Parsed payload.
	pub body: ResponseBody,
	/// HTTP attempts made, 2 when the 401 retry fired.
	pub attempts: u8,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Parsed JSON payload, when there is one.
	pub fn json(&self) -> Option<&Value> {
		match &self.body {
			ResponseBody::Json(value) => Some(value),
			_ => None,
		}
	}

	/// Deserializes the JSON payload into `T`, reporting the failing field path.
	///
	/// Returns `None` when the body is empty or malformed.
	pub fn deserialize<T>(
		&self,
	) -> Option<Result<T, serde_path_to_error::Error<serde_json::Error>>>
	where
		T: DeserializeOwned,
	{
		self.json().map(|value| serde_path_to_error::deserialize(value))
	}
}

/// Returns `true` when the media type (parameters ignored) is `application/json`.
pub fn is_json_media_type(content_type: &str) -> bool {
	content_type
		.split(';')
		.next()
		.is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}

/// Applies the JSON contract to a non-401 response.
///
/// Empty payloads are accepted whatever their content type; any other payload must be
/// declared `application/json`, otherwise the body is handed back untouched inside
/// [`Error::NonJsonResponse`].
pub(crate) fn interpret(response: HttpResponse, attempts: u8) -> Result<ApiResponse> {
	let status = response.status().as_u16();
	let (parts, body) = response.into_parts();

	if body.is_empty() {
		let headers = parts.headers;

		return Ok(ApiResponse { status, headers, body: ResponseBody::Empty, attempts });
	}

	let content_type =
		parts.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).map(str::to_owned);

	if !content_type.as_deref().is_some_and(is_json_media_type) {
		return Err(Error::NonJsonResponse { status, content_type, body });
	}

	let body = ResponseBody::from_bytes(body);

	Ok(ApiResponse { status, headers: parts.headers, body, attempts })
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	// self
	use super::*;

	fn response(status: u16, content_type: Option<&str>, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).expect("Status should be valid.");

		if let Some(content_type) = content_type {
			response.headers_mut().insert(
				CONTENT_TYPE,
				content_type.parse().expect("Content type should be a valid header."),
			);
		}

		response
	}

	#[test]
	fn media_type_check_ignores_case_and_parameters() {
		assert!(is_json_media_type("application/json"));
		assert!(is_json_media_type("Application/JSON; charset=utf-8"));
		assert!(!is_json_media_type("text/html"));
		assert!(!is_json_media_type("application/jsonp"));
		assert!(!is_json_media_type(""));
	}

	#[test]
	fn html_success_is_rejected_with_body_untouched() {
		let err = interpret(response(200, Some("text/html"), "<p>hi</p>"), 1)
			.expect_err("HTML must violate the JSON contract.");
		let Error::NonJsonResponse { status, content_type, body } = err else {
			panic!("Expected a non-JSON error, got {err:?}.");
		};

		assert_eq!(status, 200);
		assert_eq!(content_type.as_deref(), Some("text/html"));
		assert_eq!(body, b"<p>hi</p>");
	}

	#[test]
	fn missing_content_type_is_rejected() {
		assert!(matches!(
			interpret(response(500, None, "oops"), 1),
			Err(Error::NonJsonResponse { status: 500, content_type: None, .. })
		));
	}

	#[test]
	fn malformed_json_keeps_raw_payload() {
		let parsed = interpret(response(200, Some("application/json"), "{not json"), 1)
			.expect("A JSON content type should be accepted.");

		assert!(matches!(
			parsed.body,
			ResponseBody::Malformed { ref raw, .. } if raw == b"{not json"
		));
		assert!(parsed.json().is_none());
	}

	#[test]
	fn empty_payload_is_accepted() {
		let parsed =
			interpret(response(204, None, ""), 2).expect("An empty 204 should be accepted.");

		assert!(matches!(parsed.body, ResponseBody::Empty));
		assert!(parsed.is_success());
		assert_eq!(parsed.attempts, 2);
	}

	#[test]
	fn json_payload_deserializes_with_paths() {
		#[derive(Debug, Deserialize)]
		struct User {
			#[allow(dead_code)]
			id: String,
		}

		let parsed = interpret(response(200, Some("application/json"), r#"{"id":42}"#), 1)
			.expect("JSON should be accepted.");
		let err = parsed
			.deserialize::<User>()
			.expect("A JSON body should be present.")
			.expect_err("A numeric id must not deserialize into a string.");

		assert_eq!(err.path().to_string(), "id");
	}
}
