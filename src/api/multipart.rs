//
//  sharepoint-client
//  api/multipart.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Multipart Batch Response Parsing
//!
//! A batch response is one `multipart/mixed` text body in which every part
//! is itself a raw HTTP response block:
//!
//! ```text
//! --batchresponse_{guid}
//! Content-Type: application/http
//!
//! HTTP/1.1 200 OK
//! CONTENT-TYPE: application/json;odata=verbose
//!
//! {"d":{"Title":"Tasks"}}
//!
//! --batchresponse_{guid}--
//! ```
//!
//! [`parse_batch_response`] walks the body line by line through a small
//! state machine and produces one [`RecordedResponse`] per embedded part.
//! The caller (the batch coordinator) is responsible for checking that the
//! record count matches the number of requests sent.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::common::{RecordedResponse, SpError};

/// Prefix of every outer boundary line in a batch response.
const RESPONSE_BOUNDARY_PREFIX: &str = "--batchresponse_";

/// Matches an embedded status line, capturing the code and status text.
static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^HTTP/[0-9.]+ +([0-9]+) +(.*)").expect("status pattern is valid"));

/// Parser states, advanced one line at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Searching for the next outer boundary line.
    Batch,
    /// Skipping the part headers that precede the embedded status line.
    BatchHeaders,
    /// Expecting the embedded `HTTP/<version> <code> <text>` line.
    Status,
    /// Skipping the embedded response's own headers.
    StatusHeaders,
    /// Expecting the single body line of the embedded response.
    Body,
}

/// Splits a raw multipart batch response into individual response records.
///
/// # Errors
///
/// Returns [`SpError::BatchParse`] for:
///
/// - non-blank content between parts where a boundary was expected
/// - an embedded status line that does not match `HTTP/<version> <code> <text>`
/// - input that ends anywhere other than immediately after the closing
///   boundary has been consumed
///
/// # Notes
///
/// A `204 No Content` part carries no body line; the record is emitted
/// empty and the current line is re-examined as the next boundary.
pub fn parse_batch_response(body: &str) -> Result<Vec<RecordedResponse>, SpError> {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut records = Vec::new();
    let mut state = ParseState::Batch;
    let mut status: u16 = 0;
    let mut status_text = String::new();

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index].trim_end_matches('\r');
        match state {
            ParseState::Batch => {
                if line.starts_with(RESPONSE_BOUNDARY_PREFIX) {
                    state = ParseState::BatchHeaders;
                } else if !line.trim().is_empty() {
                    return Err(SpError::BatchParse(format!(
                        "invalid response, line {index}: {line}"
                    )));
                }
            }
            ParseState::BatchHeaders => {
                if line.trim().is_empty() {
                    state = ParseState::Status;
                }
            }
            ParseState::Status => {
                let captures = STATUS_LINE.captures(line).ok_or_else(|| {
                    SpError::BatchParse(format!("invalid status, line {index}: {line}"))
                })?;
                status = captures[1].parse().map_err(|_| {
                    SpError::BatchParse(format!("invalid status code, line {index}: {line}"))
                })?;
                status_text = captures[2].trim_end().to_string();
                state = ParseState::StatusHeaders;
            }
            ParseState::StatusHeaders => {
                if line.trim().is_empty() {
                    state = ParseState::Body;
                }
            }
            ParseState::Body => {
                if status == 204 {
                    // No body line to consume; re-examine this line as a
                    // boundary.
                    records.push(RecordedResponse {
                        status,
                        status_text: status_text.clone(),
                        body: String::new(),
                    });
                    state = ParseState::Batch;
                    continue;
                }
                records.push(RecordedResponse {
                    status,
                    status_text: status_text.clone(),
                    body: line.to_string(),
                });
                state = ParseState::Batch;
            }
        }
        index += 1;
    }

    if state != ParseState::Status {
        return Err(SpError::BatchParse("unexpected end of input".to_string()));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(status: u16, text: &str, body: &str) -> String {
        format!(
            "--batchresponse_guid\nContent-Type: application/http\nContent-Transfer-Encoding: binary\n\nHTTP/1.1 {status} {text}\nCONTENT-TYPE: application/json;odata=verbose\n\n{body}\n\n"
        )
    }

    #[test]
    fn test_three_well_formed_records() {
        let body = format!(
            "{}{}{}--batchresponse_guid--\n",
            part(200, "OK", r#"{"d":{"Id":1}}"#),
            part(201, "Created", r#"{"d":{"Id":2}}"#),
            part(404, "Not Found", r#"{"odata.error":{"message":{"value":"missing"}}}"#),
        );

        let records = parse_batch_response(&body).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].status, 200);
        assert_eq!(records[0].status_text, "OK");
        assert_eq!(records[0].body, r#"{"d":{"Id":1}}"#);
        assert_eq!(records[1].status, 201);
        assert_eq!(records[2].status, 404);
        assert_eq!(records[2].status_text, "Not Found");
    }

    #[test]
    fn test_no_content_record_is_empty() {
        let body = format!(
            "--batchresponse_guid\nContent-Type: application/http\n\nHTTP/1.1 204 No Content\n\n{}--batchresponse_guid--\n",
            part(200, "OK", r#"{"d":{"Id":9}}"#),
        );

        let records = parse_batch_response(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, 204);
        assert_eq!(records[0].body, "");
        assert_eq!(records[1].status, 200);
        assert_eq!(records[1].body, r#"{"d":{"Id":9}}"#);
    }

    #[test]
    fn test_unexpected_content_between_parts() {
        let body = "garbage before any boundary\n";
        match parse_batch_response(body) {
            Err(SpError::BatchParse(message)) => {
                assert!(message.contains("invalid response"), "got: {message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_status_line() {
        let body = "--batchresponse_guid\nContent-Type: application/http\n\nNOT-A-STATUS\n";
        match parse_batch_response(body) {
            Err(SpError::BatchParse(message)) => {
                assert!(message.contains("invalid status"), "got: {message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_input() {
        // Ends inside the part headers, before any status line was seen.
        let body = "--batchresponse_guid\nContent-Type: application/http\n";
        match parse_batch_response(body) {
            Err(SpError::BatchParse(message)) => {
                assert_eq!(message, "unexpected end of input");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_crlf_line_endings() {
        let body = "--batchresponse_guid\r\nContent-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\n\r\n{\"value\":[]}\r\n\r\n--batchresponse_guid--\r\n";
        let records = parse_batch_response(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, 200);
        assert_eq!(records[0].body, "{\"value\":[]}");
    }
}
