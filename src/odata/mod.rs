//
//  sharepoint-client
//  odata/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! OData Response Handling
//!
//! SharePoint answers the same logical request in one of several OData
//! dialects depending on the negotiated metadata level. The verbose dialect
//! wraps payloads in a `d` envelope and carries identity under `__metadata`;
//! the minimal dialect exposes `odata.*`-prefixed annotations; a no-metadata
//! response carries nothing chaining can use.
//!
//! This module normalizes those differences:
//!
//! - [`ODataShape`] - Tagged classification of a payload's dialect
//! - [`extract_entity_url`] - Identity/edit-link extraction with exhaustive
//!   matching over the dialect variants
//! - [`ResponseParser`] - The parser seam every request descriptor carries
//! - [`ODataDefaultParser`] - Status checking, error-envelope mining, and
//!   payload unwrapping used by all terminal verbs unless overridden
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sharepoint_client::odata::{detect_shape, extract_entity_url, ODataShape};
//!
//! let verbose = json!({"__metadata": {"uri": "https://x.com/_api/Web/Lists(guid'1')"}});
//! assert_eq!(detect_shape(&verbose), ODataShape::Verbose);
//! assert_eq!(
//!     extract_entity_url(&verbose).unwrap(),
//!     "https://x.com/_api/Web/Lists(guid'1')"
//! );
//!
//! let bare = json!({"Title": "no metadata here"});
//! assert_eq!(detect_shape(&bare), ODataShape::NoMetadata);
//! assert!(extract_entity_url(&bare).is_err());
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::api::common::{RecordedResponse, SpError};

/// The OData dialect a payload was returned in.
///
/// Produced by [`detect_shape`]; consumers match exhaustively over the
/// variants instead of probing properties ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataShape {
    /// Verbose dialect: `d` envelope, identity under `__metadata`.
    Verbose,
    /// Minimal-metadata dialect: `odata.*` / `@odata.*` annotations.
    Minimal,
    /// No metadata: nothing that identifies the entity.
    NoMetadata,
}

/// Classifies a payload by OData dialect.
pub fn detect_shape(candidate: &Value) -> ODataShape {
    let Some(object) = candidate.as_object() else {
        return ODataShape::NoMetadata;
    };

    if object.contains_key("__metadata") || object.contains_key("d") {
        return ODataShape::Verbose;
    }

    if object
        .keys()
        .any(|key| key.starts_with("odata.") || key.starts_with("@odata."))
    {
        return ODataShape::Minimal;
    }

    ODataShape::NoMetadata
}

/// Extracts the identity/edit-link URL from an entity payload.
///
/// The returned URL is what child resources are derived from when chaining
/// off a response (`.../Web/Lists(guid'...')` and the like).
///
/// # Errors
///
/// Returns [`SpError::ODataId`] with the offending payload attached when the
/// payload carries no recognizable identity field, which is the case for
/// no-metadata responses.
pub fn extract_entity_url(candidate: &Value) -> Result<String, SpError> {
    match detect_shape(candidate) {
        ODataShape::Verbose => {
            let metadata = candidate
                .get("__metadata")
                .or_else(|| candidate.get("d").and_then(|d| d.get("__metadata")));
            metadata
                .and_then(|m| m.get("uri").or_else(|| m.get("id")))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SpError::ODataId(candidate.clone()))
        }
        ODataShape::Minimal => candidate
            .get("odata.id")
            .or_else(|| candidate.get("odata.editLink"))
            .or_else(|| candidate.get("@odata.id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SpError::ODataId(candidate.clone())),
        ODataShape::NoMetadata => Err(SpError::ODataId(candidate.clone())),
    }
}

/// Unwraps the standard OData envelopes from a parsed payload.
///
/// Verbose collections arrive as `{"d": {"results": [...]}}`, verbose
/// entities as `{"d": {...}}`, and minimal collections as
/// `{"value": [...]}`; anything else passes through untouched.
pub fn unwrap_envelopes(parsed: Value) -> Value {
    if let Some(object) = parsed.as_object() {
        if let Some(d) = object.get("d") {
            if let Some(results) = d.get("results") {
                return results.clone();
            }
            return d.clone();
        }
        if let Some(value) = object.get("value") {
            return value.clone();
        }
    }
    parsed
}

/// Mines an error message out of a failed response body.
///
/// SharePoint error envelopes come in two shapes depending on dialect:
///
/// ```json
/// {"odata.error": {"message": {"value": "Human readable message"}}}
/// ```
///
/// ```json
/// {"error": {"message": {"value": "Human readable message"}}}
/// ```
///
/// Both are probed in order, followed by flat `error.message` / `message`
/// string fields; the raw body is the fallback when nothing matches.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json
            .pointer("/odata.error/message/value")
            .and_then(Value::as_str)
        {
            return message.to_string();
        }

        if let Some(message) = json
            .pointer("/error/message/value")
            .and_then(Value::as_str)
        {
            return message.to_string();
        }

        if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
            return message.to_string();
        }

        if let Some(message) = json.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }

    body.to_string()
}

/// Parses one normalized response into the value handed back to the caller.
///
/// Every request descriptor carries one of these; the batch coordinator and
/// the direct dispatch path invoke it identically, which is what guarantees
/// a queryable behaves the same inside and outside a batch. Parsers may be
/// asynchronous.
#[async_trait]
pub trait ResponseParser: Send + Sync {
    /// Parses a response, raising a typed error for non-success statuses.
    async fn parse(&self, response: RecordedResponse) -> Result<Value, SpError>;
}

/// The default parser applied by all terminal verbs.
///
/// Raises [`SpError::Http`] for non-2xx statuses with the message mined from
/// the OData error envelope, maps `204 No Content` and empty bodies to
/// `Value::Null`, and unwraps the `d` / `d.results` / `value` envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ODataDefaultParser;

#[async_trait]
impl ResponseParser for ODataDefaultParser {
    async fn parse(&self, response: RecordedResponse) -> Result<Value, SpError> {
        if !response.is_success() {
            return Err(SpError::Http {
                status: response.status,
                message: extract_error_message(&response.body),
            });
        }

        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let parsed: Value = serde_json::from_str(&response.body)?;
        Ok(unwrap_envelopes(parsed))
    }
}
