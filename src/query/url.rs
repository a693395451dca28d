//
//  sharepoint-client
//  query/url.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! URL Assembly Helpers
//!
//! Pure string helpers for building SharePoint resource URLs: path joining,
//! absolute-URL detection, site-collection derivation from the `_api/`
//! marker, and OData parameter-alias rewriting.
//!
//! SharePoint URLs embed OData keys in parentheses
//! (`.../lists/getByTitle('Tasks')/items(19)`), so none of these helpers may
//! treat a parenthesized segment as a path boundary; the parent-inference
//! logic built on top of them lives in [`crate::query::queryable`].

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::common::SpError;

/// Matches an aliased parameter literal `'!@label::value'`.
static ALIAS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)'!(@.*?)::(.*?)'").expect("alias pattern is valid"));

/// Checks whether a URL is absolute.
///
/// Recognizes `https://`, `http://` and protocol-relative `//` prefixes,
/// case-insensitively.
///
/// # Example
///
/// ```rust
/// use sharepoint_client::query::url::is_url_absolute;
///
/// assert!(is_url_absolute("https://tenant.sharepoint.com/sites/dev"));
/// assert!(is_url_absolute("HTTP://localhost"));
/// assert!(is_url_absolute("//tenant.sharepoint.com"));
/// assert!(!is_url_absolute("/sites/dev/_api/web"));
/// assert!(!is_url_absolute("_api/web"));
/// ```
pub fn is_url_absolute(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("//")
}

/// Joins URL path segments with single `/` separators.
///
/// Empty segments are skipped; at most one leading and one trailing slash is
/// stripped from each segment, so protocol prefixes and internal slashes
/// survive intact.
///
/// # Example
///
/// ```rust
/// use sharepoint_client::query::url::combine;
///
/// assert_eq!(combine(&["https://x.com/", "/_api/web"]), "https://x.com/_api/web");
/// assert_eq!(combine(&["a", "", "b/"]), "a/b");
/// assert_eq!(combine(&["items(19)", "fields"]), "items(19)/fields");
/// ```
pub fn combine(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| {
            let p = p.strip_prefix('/').unwrap_or(p);
            p.strip_suffix('/').unwrap_or(p)
        })
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derives the site-collection URL by truncating at the `_api/` marker.
///
/// Every REST resource URL contains an `_api/` segment separating the site
/// collection from the serviced resource; the prefix is what the digest
/// endpoint and the batch endpoint are addressed against.
///
/// # Errors
///
/// Returns [`SpError::ApiUrlUndetermined`] when no `_api/` marker exists in
/// the URL.
///
/// # Example
///
/// ```rust
/// use sharepoint_client::query::url::extract_site_url;
///
/// let site = extract_site_url("https://x.com/sites/dev/_api/web/lists").unwrap();
/// assert_eq!(site, "https://x.com/sites/dev/");
/// assert!(extract_site_url("https://x.com/sites/dev").is_err());
/// ```
pub fn extract_site_url(url: &str) -> Result<String, SpError> {
    match url.find("_api/") {
        Some(index) => Ok(url[..index].to_string()),
        None => Err(SpError::ApiUrlUndetermined(url.to_string())),
    }
}

/// Rewrites aliased parameters out of a URL and its query values.
///
/// A value written as `'!@label::value'` marks an OData parameter alias: the
/// literal must appear in the URL position as a reference (`@label`) while
/// the value itself travels as a separate query parameter (`@label='value'`).
/// This is required when a value is used inside a function-call segment yet
/// must remain independently addressable.
///
/// Returns the rewritten URL plus the full query mapping: original entries
/// (with any aliases in their values rewritten) followed by the extracted
/// alias parameters, in encounter order.
pub fn resolve_aliases(
    url: &str,
    query: &IndexMap<String, String>,
) -> (String, IndexMap<String, String>) {
    let mut extracted: IndexMap<String, String> = IndexMap::new();

    let mut rewrite = |input: &str| -> String {
        ALIAS_PATTERN
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let label = caps[1].to_string();
                extracted.insert(label.clone(), format!("'{}'", &caps[2]));
                label
            })
            .into_owned()
    };

    let rewritten_url = rewrite(url);
    let mut resolved: IndexMap<String, String> = query
        .iter()
        .map(|(k, v)| (k.clone(), rewrite(v)))
        .collect();
    resolved.extend(extracted);

    (rewritten_url, resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url_absolute() {
        assert!(is_url_absolute("https://tenant.sharepoint.com"));
        assert!(is_url_absolute("http://localhost:8080/sites/dev"));
        assert!(is_url_absolute("//cdn.sharepoint.com"));
        assert!(!is_url_absolute("sites/dev"));
        assert!(!is_url_absolute("/sites/dev"));
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine(&["https://x.com", "_api/web"]), "https://x.com/_api/web");
        assert_eq!(combine(&["https://x.com/", "/_api/web/"]), "https://x.com/_api/web");
        assert_eq!(combine(&["", "lists"]), "lists");
        assert_eq!(combine(&["/items(19)", "fields"]), "items(19)/fields");
    }

    #[test]
    fn test_extract_site_url() {
        assert_eq!(
            extract_site_url("https://x.com/sites/dev/_api/web/lists/getByTitle('t')").unwrap(),
            "https://x.com/sites/dev/"
        );

        match extract_site_url("https://x.com/sites/dev/web") {
            Err(SpError::ApiUrlUndetermined(url)) => {
                assert_eq!(url, "https://x.com/sites/dev/web");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_aliases_in_url() {
        let query = IndexMap::new();
        let (url, resolved) = resolve_aliases(
            "web/getFolderByServerRelativePath('!@p1::/sites/dev/Shared Documents')",
            &query,
        );

        assert_eq!(url, "web/getFolderByServerRelativePath(@p1)");
        assert_eq!(
            resolved.get("@p1").map(String::as_str),
            Some("'/sites/dev/Shared Documents'")
        );
    }

    #[test]
    fn test_resolve_aliases_in_query_values() {
        let mut query = IndexMap::new();
        query.insert("$filter".to_string(), "startswith(Url,'!@x::foo')".to_string());

        let (_, resolved) = resolve_aliases("web", &query);
        assert_eq!(
            resolved.get("$filter").map(String::as_str),
            Some("startswith(Url,@x)")
        );
        assert_eq!(resolved.get("@x").map(String::as_str), Some("'foo'"));
    }

    #[test]
    fn test_resolve_aliases_without_aliases_is_identity() {
        let mut query = IndexMap::new();
        query.insert("$top".to_string(), "5".to_string());

        let (url, resolved) = resolve_aliases("web/lists", &query);
        assert_eq!(url, "web/lists");
        assert_eq!(resolved.get("$top").map(String::as_str), Some("5"));
        assert_eq!(resolved.len(), 1);
    }
}
