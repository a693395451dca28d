//
//  sharepoint-client
//  api/common/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Common API Types for the SharePoint REST Client
//!
//! This module provides the shared types used by every layer of the client:
//! the unified error enum, the request option bundle carried from the fluent
//! builder down to the wire, and the normalized response record shared by
//! live HTTP exchanges and embedded batch responses.
//!
//! # Overview
//!
//! - [`SpError`] - Unified error type for all client operations
//! - [`RequestOptions`] - Headers and body accumulated prior to dispatch
//! - [`RecordedResponse`] - Status/status-text/body triple consumed by parsers
//! - Pagination types (re-exported from [`pagination`] submodule)
//!
//! # Example
//!
//! ```rust
//! use sharepoint_client::api::common::{RequestOptions, SpError};
//!
//! fn handle_result<T>(result: Result<T, SpError>) {
//!     match result {
//!         Ok(_) => println!("Success!"),
//!         Err(SpError::ApiUrlUndetermined(url)) => println!("No API url in: {}", url),
//!         Err(e) => println!("Error: {}", e),
//!     }
//! }
//!
//! let options = RequestOptions::new()
//!     .header("If-Match", "*")
//!     .with_body(r#"{"Title":"Updated"}"#.to_string());
//! assert!(options.has_header("if-match"));
//! ```
//!
//! # Notes
//!
//! - Header maps preserve insertion order and keep keys unique
//! - Header lookups are case-insensitive, matching HTTP semantics
//! - All types implement `Debug` for easy inspection

use indexmap::IndexMap;
use thiserror::Error;

mod pagination;

pub use pagination::*;

/// Unified error type for all SharePoint client operations.
///
/// `SpError` covers the full failure surface of the client: client-side
/// validation raised synchronously before any I/O, transport and throttling
/// failures, malformed batch responses, and OData payloads that cannot be
/// chained from.
///
/// # Variants
///
/// | Variant | Raised | Stage |
/// |---------|--------|-------|
/// | `BatchParse` | Malformed multipart body or record-count mismatch | Batch response parsing |
/// | `ODataId` | Entity payload lacks an identity/edit-link field | Chaining from a response |
/// | `MaxCommentLength` | Comment argument over 1023 characters | Pre-I/O validation |
/// | `NotSupportedInBatch` | Multi-round-trip operation queued into a batch | Pre-I/O validation |
/// | `ApiUrlUndetermined` | No `_api/` marker or base URL source found | Dispatch |
/// | `Http` | Non-2xx response surfaced by a parser | Response parsing |
/// | `RetryBudgetExhausted` | 429/503 persisted through every retry | Transport |
/// | `BatchFailed` | The enclosing batch POST or parse failed | Batch execution |
/// | `BatchAbandoned` | Batch dropped without ever executing | Awaiting a queued request |
/// | `Network` | Connection, TLS or protocol failure | Transport |
/// | `Json` | Response body is not the expected JSON | Response parsing |
///
/// # Notes
///
/// - Validation errors (`MaxCommentLength`, `NotSupportedInBatch`) are always
///   returned before any request is queued or sent
/// - `ODataId` carries the offending payload for diagnostics
/// - Retryable statuses (429/503) only surface as `RetryBudgetExhausted`
///   once the transport's backoff budget is spent
#[derive(Error, Debug)]
pub enum SpError {
    /// The multipart batch response could not be parsed.
    ///
    /// Covers unexpected content between parts, unparsable status lines,
    /// premature end of input, and a record count that does not match the
    /// number of requests sent. Fatal to the whole batch.
    #[error("batch response could not be parsed: {0}")]
    BatchParse(String),

    /// An entity payload has no recognizable identity or edit-link field.
    ///
    /// Raised when deriving a child resource URL from a response that was
    /// returned with no metadata. The offending payload is attached.
    #[error("entity payload has no recognizable identity field")]
    ODataId(serde_json::Value),

    /// A comment argument exceeds the fixed 1023-character limit.
    ///
    /// Validated client-side before any network call.
    #[error("comment is {length} characters; the maximum allowed is 1023")]
    MaxCommentLength {
        /// Actual character count of the rejected comment.
        length: usize,
    },

    /// An operation requiring multiple sequential round trips was invoked
    /// while a batch is active. Raised synchronously, before any request
    /// is queued.
    #[error("operation '{0}' is not supported within a batch")]
    NotSupportedInBatch(&'static str),

    /// No `_api/` marker or configured base URL could be found where one is
    /// structurally required (digest derivation, batch endpoint resolution,
    /// final URL validation).
    #[error("unable to determine a valid API url from: {0}")]
    ApiUrlUndetermined(String),

    /// The server answered with a non-success status.
    ///
    /// Produced by response parsers; the message is extracted from the
    /// OData error envelope when one is present, otherwise the raw body.
    #[error("API error ({status}): {message}")]
    Http {
        /// HTTP status code of the failed response.
        status: u16,
        /// Extracted error message or raw response body.
        message: String,
    },

    /// Throttling (429) or unavailability (503) persisted through the
    /// transport's entire exponential-backoff budget. Carries the last
    /// observed response.
    #[error("retry budget exhausted after {attempts} attempts (last status {status})")]
    RetryBudgetExhausted {
        /// Status of the final, failed attempt.
        status: u16,
        /// Number of attempts performed.
        attempts: u32,
        /// Body of the final response, for diagnostics.
        body: String,
    },

    /// The enclosing batch failed as a whole (transport error on the batch
    /// POST, or a malformed multipart response). Every request queued into
    /// that batch receives this error.
    #[error("batch failed: {0}")]
    BatchFailed(String),

    /// The batch this request was queued into was dropped without being
    /// executed, so no response will ever arrive.
    #[error("batch was dropped before it was executed")]
    BatchAbandoned,

    /// A network-level error occurred during the request.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A response body could not be parsed as the expected JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request options accumulated by the fluent builder and applied at dispatch.
///
/// Holds the headers and optional body of one logical request. Options merge
/// in layers on the way to the wire: global configuration first, then
/// per-queryable configuration, then per-call options, with later layers
/// winning per key.
///
/// # Example
///
/// ```rust
/// use sharepoint_client::api::common::RequestOptions;
///
/// let mut base = RequestOptions::new().header("Accept", "application/json");
/// let call = RequestOptions::new()
///     .header("accept", "application/json;odata=verbose")
///     .with_body("{}".to_string());
///
/// base.merge(&call);
/// assert_eq!(base.header_value("Accept"), Some("application/json;odata=verbose"));
/// assert_eq!(base.body.as_deref(), Some("{}"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers in insertion order, unique per (case-insensitive) name.
    pub headers: IndexMap<String, String>,
    /// Raw request body, already serialized.
    pub body: Option<String>,
}

impl RequestOptions {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a header, returning `self` for chaining.
    ///
    /// Replacement is case-insensitive on the header name: setting
    /// `accept` after `Accept` overwrites the earlier entry in place.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Sets the request body, returning `self` for chaining.
    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds or replaces a header in place (case-insensitive on the name).
    pub fn set_header(&mut self, name: &str, value: &str) {
        let existing = self
            .headers
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned();
        match existing {
            Some(key) => {
                self.headers.insert(key, value.to_string());
            }
            None => {
                self.headers.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Merges `other` into `self`; `other` wins on conflicting keys and, if
    /// it carries a body, that body replaces the current one.
    pub fn merge(&mut self, other: &RequestOptions) {
        for (name, value) in &other.headers {
            self.set_header(name, value);
        }
        if other.body.is_some() {
            self.body = other.body.clone();
        }
    }

    /// Returns the value of a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Checks for the presence of a header by case-insensitive name.
    pub fn has_header(&self, name: &str) -> bool {
        self.header_value(name).is_some()
    }

    /// Removes a header by case-insensitive name, returning its value.
    ///
    /// Used when a tunneled verb header (`X-HTTP-Method`) is consumed into
    /// the request line and must not also be emitted as a header.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let key = self
            .headers
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()?;
        self.headers.shift_remove(&key)
    }
}

/// A normalized HTTP response record.
///
/// One of these exists for every logical response the client sees, whether
/// it arrived as a live `reqwest` response or as an embedded record inside
/// a multipart batch body. Response parsers only ever consume this shape,
/// which is what lets a single parser serve both dispatch paths.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    /// Numeric HTTP status code.
    pub status: u16,
    /// Status text as sent by the server (canonical reason for live calls).
    pub status_text: String,
    /// Raw response body text. Empty for `204 No Content`.
    pub body: String,
}

impl RecordedResponse {
    /// Captures a live `reqwest` response into a normalized record.
    pub async fn from_live(response: reqwest::Response) -> Result<Self, SpError> {
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await?;
        Ok(Self {
            status: status.as_u16(),
            status_text,
            body,
        })
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_header_replaces_case_insensitively() {
        let options = RequestOptions::new()
            .header("Accept", "application/json")
            .header("accept", "application/json;odata=verbose");

        assert_eq!(options.headers.len(), 1);
        assert_eq!(
            options.header_value("ACCEPT"),
            Some("application/json;odata=verbose")
        );
    }

    #[test]
    fn test_options_merge_later_wins() {
        let mut base = RequestOptions::new()
            .header("Accept", "application/json")
            .header("X-One", "1");
        let later = RequestOptions::new()
            .header("accept", "text/plain")
            .with_body("body".to_string());

        base.merge(&later);
        assert_eq!(base.header_value("Accept"), Some("text/plain"));
        assert_eq!(base.header_value("X-One"), Some("1"));
        assert_eq!(base.body.as_deref(), Some("body"));
    }

    #[test]
    fn test_options_merge_keeps_existing_body() {
        let mut base = RequestOptions::new().with_body("original".to_string());
        base.merge(&RequestOptions::new().header("X-Two", "2"));
        assert_eq!(base.body.as_deref(), Some("original"));
    }

    #[test]
    fn test_remove_header() {
        let mut options = RequestOptions::new().header("X-HTTP-Method", "MERGE");
        assert_eq!(options.remove_header("x-http-method").as_deref(), Some("MERGE"));
        assert!(options.headers.is_empty());
        assert!(options.remove_header("x-http-method").is_none());
    }

    #[test]
    fn test_recorded_response_success() {
        let ok = RecordedResponse {
            status: 204,
            status_text: "No Content".to_string(),
            body: String::new(),
        };
        let not_found = RecordedResponse {
            status: 404,
            status_text: "Not Found".to_string(),
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!not_found.is_success());
    }
}
