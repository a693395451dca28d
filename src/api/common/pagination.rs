//
//  sharepoint-client
//  api/common/pagination.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/21.
//  Copyright (c) 2026 IAMNGONI. All rights reserved.
//

//! Paged Collection Traversal
//!
//! Large SharePoint collections are returned one page at a time, with each
//! page carrying the continuation URL of the next. The continuation field
//! differs by OData dialect:
//!
//! | Dialect | Continuation field |
//! |---------|--------------------|
//! | Verbose | `d.__next` |
//! | Minimal | `odata.nextLink` / `@odata.nextLink` |
//!
//! [`PageCursor`] is a lazy, restartable sequence over those pages: each
//! [`next_page`](PageCursor::next_page) call performs exactly one GET, and
//! nothing is fetched until asked. [`fold`](PageCursor::fold) and
//! [`collect_all`](PageCursor::collect_all) consume the cursor when the
//! whole collection is wanted.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::api::common::{RequestOptions, SpError};
use crate::context::SpRuntime;
use crate::odata::extract_error_message;

/// One page of a collection plus its continuation URL.
#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    /// Items contained in this page.
    pub items: Vec<T>,
    /// Continuation URL of the next page; `None` on the last page.
    pub next_url: Option<String>,
}

impl<T> PagedResult<T> {
    /// Checks whether a further page exists.
    pub fn has_next(&self) -> bool {
        self.next_url.is_some()
    }
}

impl PagedResult<Value> {
    /// Extracts a page from a raw OData payload, handling both dialects.
    pub fn from_value(parsed: &Value) -> Self {
        let next_url = parsed
            .pointer("/d/__next")
            .or_else(|| parsed.get("odata.nextLink"))
            .or_else(|| parsed.get("@odata.nextLink"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let items = parsed
            .pointer("/d/results")
            .or_else(|| parsed.get("value"))
            .or_else(|| parsed.get("d"))
            .unwrap_or(parsed)
            .as_array()
            .cloned()
            .unwrap_or_default();

        Self { items, next_url }
    }
}

/// A lazy cursor over the pages of a collection.
///
/// Obtained from [`Queryable::pages`](crate::query::queryable::Queryable::pages).
/// The cursor owns its continuation state, so it can be driven page by page,
/// folded, or drained completely, and dropped at any point without cost.
///
/// # Example
///
/// ```rust,no_run
/// use sharepoint_client::context::{RuntimeContext, SpRuntime};
///
/// # async fn example() -> Result<(), sharepoint_client::SpError> {
/// let runtime = SpRuntime::new(
///     RuntimeContext::new().with_base_url("https://tenant.sharepoint.com/sites/dev"),
/// )?;
///
/// let mut cursor = runtime
///     .queryable("_api/web/lists/getByTitle('Tasks')/items")
///     .top(500)
///     .pages();
///
/// while let Some(page) = cursor.next_page().await? {
///     println!("fetched {} items", page.items.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PageCursor {
    runtime: Arc<SpRuntime>,
    next_url: Option<String>,
}

impl PageCursor {
    pub(crate) fn new(runtime: Arc<SpRuntime>, start_url: String) -> Self {
        Self {
            runtime,
            next_url: Some(start_url),
        }
    }

    /// Checks whether a further page is available without fetching it.
    pub fn has_next(&self) -> bool {
        self.next_url.is_some()
    }

    /// Fetches the next page, or returns `None` when the collection is
    /// exhausted.
    pub async fn next_page(&mut self) -> Result<Option<PagedResult<Value>>, SpError> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };

        let response = self
            .runtime
            .http()
            .fetch(&url, Method::GET, &RequestOptions::new())
            .await?;
        if !response.is_success() {
            return Err(SpError::Http {
                status: response.status,
                message: extract_error_message(&response.body),
            });
        }

        let parsed: Value = serde_json::from_str(&response.body)?;
        let page = PagedResult::from_value(&parsed);
        self.next_url = page.next_url.clone();
        Ok(Some(page))
    }

    /// Folds every remaining page into an accumulator.
    pub async fn fold<B, F>(mut self, init: B, mut f: F) -> Result<B, SpError>
    where
        F: FnMut(B, PagedResult<Value>) -> B,
    {
        let mut accumulator = init;
        while let Some(page) = self.next_page().await? {
            accumulator = f(accumulator, page);
        }
        Ok(accumulator)
    }

    /// Drains the cursor, concatenating the items of every page in order.
    pub async fn collect_all(self) -> Result<Vec<Value>, SpError> {
        self.fold(Vec::new(), |mut items, page| {
            items.extend(page.items);
            items
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use serde_json::json;

    #[test]
    fn test_from_value_verbose_dialect() {
        let payload = json!({
            "d": {
                "results": [{"Id": 1}, {"Id": 2}],
                "__next": "https://x.com/_api/web/items?$skiptoken=2"
            }
        });

        let page = PagedResult::from_value(&payload);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_next());
        assert_eq!(
            page.next_url.as_deref(),
            Some("https://x.com/_api/web/items?$skiptoken=2")
        );
    }

    #[test]
    fn test_from_value_minimal_dialect() {
        let payload = json!({
            "value": [{"Id": 3}],
            "odata.nextLink": "https://x.com/_api/web/items?$skiptoken=3"
        });

        let page = PagedResult::from_value(&payload);
        assert_eq!(page.items.len(), 1);
        assert!(page.has_next());
    }

    #[test]
    fn test_from_value_last_page() {
        let page = PagedResult::from_value(&json!({"d": {"results": [{"Id": 9}]}}));
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_next());
    }

    #[tokio::test]
    async fn test_collect_all_walks_every_page() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let page_two_url = format!("{}/_api/web/itemsPageTwo", server.url());
        server
            .mock("GET", "/_api/web/items")
            .with_status(200)
            .with_body(format!(
                r#"{{"d":{{"results":[{{"Id":1}},{{"Id":2}}],"__next":"{page_two_url}"}}}}"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/_api/web/itemsPageTwo")
            .with_status(200)
            .with_body(r#"{"d":{"results":[{"Id":3}]}}"#)
            .create_async()
            .await;

        let runtime = SpRuntime::with_digest_store(
            RuntimeContext::new().with_base_url(&server.url()),
            Arc::new(crate::auth::digest::DigestStore::new()),
        )?;

        let items = runtime
            .queryable("_api/web/items")
            .pages()
            .collect_all()
            .await?;

        assert_eq!(items, vec![json!({"Id": 1}), json!({"Id": 2}), json!({"Id": 3})]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cursor_is_lazy() {
        // No mocks: a fetch would fail, so a never-driven cursor must not
        // perform one.
        let server = mockito::Server::new_async().await;
        let runtime = SpRuntime::with_digest_store(
            RuntimeContext::new().with_base_url(&server.url()),
            Arc::new(crate::auth::digest::DigestStore::new()),
        )
        .unwrap();

        let cursor = runtime.queryable("_api/web/items").pages();
        assert!(cursor.has_next());
        drop(cursor);
    }

    #[tokio::test]
    async fn test_error_page_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/_api/web/items")
            .with_status(403)
            .with_body(r#"{"odata.error":{"message":{"value":"Access denied"}}}"#)
            .create_async()
            .await;

        let runtime = SpRuntime::with_digest_store(
            RuntimeContext::new().with_base_url(&server.url()),
            Arc::new(crate::auth::digest::DigestStore::new()),
        )
        .unwrap();

        let mut cursor = runtime.queryable("_api/web/items").pages();
        match cursor.next_page().await {
            Err(SpError::Http { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Access denied");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
