//
//  sharepoint-client
//  util/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Utility functions shared across the crate.
//!
//! Small, pure helpers with no SharePoint protocol knowledge of their own:
//! GUID generation for batch boundaries and client-side argument validation.

use crate::api::common::SpError;

/// Maximum length accepted for comment-style arguments.
///
/// SharePoint rejects check-in/approval/publish comments longer than this,
/// so the limit is enforced client-side before any network call is made.
pub const MAX_COMMENT_LENGTH: usize = 1023;

/// Generates a new random GUID in hyphenated lowercase form.
///
/// Used for batch and change set boundary identifiers, where each execution
/// needs a fresh, collision-free token (e.g. `batch_550e8400-e29b-...`).
///
/// # Example
///
/// ```rust
/// use sharepoint_client::util::new_guid;
///
/// let id = new_guid();
/// assert_eq!(id.len(), 36);
/// assert_eq!(id.matches('-').count(), 4);
/// ```
pub fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a comment-style argument against [`MAX_COMMENT_LENGTH`].
///
/// Returns `Ok(())` when the comment fits, or [`SpError::MaxCommentLength`]
/// when it does not. Callers are expected to run this before queueing any
/// request, so the failure is always synchronous and pre-I/O.
///
/// # Example
///
/// ```rust
/// use sharepoint_client::util::validate_comment_length;
///
/// assert!(validate_comment_length("checked in").is_ok());
/// assert!(validate_comment_length(&"x".repeat(2000)).is_err());
/// ```
pub fn validate_comment_length(comment: &str) -> Result<(), SpError> {
    let length = comment.chars().count();
    if length > MAX_COMMENT_LENGTH {
        return Err(SpError::MaxCommentLength { length });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_guid_shape() {
        let id = new_guid();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_new_guid_unique() {
        assert_ne!(new_guid(), new_guid());
    }

    #[test]
    fn test_validate_comment_length() {
        assert!(validate_comment_length("").is_ok());
        assert!(validate_comment_length(&"a".repeat(1023)).is_ok());

        let err = validate_comment_length(&"a".repeat(1024)).unwrap_err();
        match err {
            SpError::MaxCommentLength { length } => assert_eq!(length, 1024),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
