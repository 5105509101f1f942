//! The generic cursor-paginated connection: wraps one store list call,
//! memoizes it for the lifetime of the connection instance, and derives
//! nodes, total count, and page info from the single result.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::BatchesError;

/// Encode a continuation offset as an opaque client cursor.
pub fn marshal_cursor(offset: i64) -> String {
    offset.to_string()
}

/// Decode a client cursor back to an offset.
pub fn unmarshal_cursor(cursor: &str) -> Result<i64> {
    cursor
        .parse()
        .map_err(|_| BatchesError::MalformedCursor(cursor.to_string()).into())
}

/// Translate wire-level `first`/`after` arguments into store limit/offset.
pub fn page_args(first: i64, after: Option<&str>) -> Result<(i64, i64)> {
    let offset = match after {
        Some(cursor) => unmarshal_cursor(cursor)?,
        None => 0,
    };
    Ok((first, offset))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PageInfo {
    pub fn done() -> Self {
        PageInfo { has_next_page: false, end_cursor: None }
    }

    pub fn next(offset: i64) -> Self {
        PageInfo { has_next_page: true, end_cursor: Some(marshal_cursor(offset)) }
    }
}

/// A cloneable error so a memoized failure can be handed to every caller of
/// the same connection instance.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    pub fn new(err: anyhow::Error) -> Self {
        SharedError(Arc::new(err))
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for SharedError {}

/// One store-backed list operation: a page fetch returning
/// `(items, next_offset)` where `next_offset == 0` means no further page,
/// and a count mirroring the same filters without paging.
#[async_trait]
pub trait ConnectionLoader: Send + Sync {
    type Node: Clone + Send + Sync;

    async fn list(&self) -> Result<(Vec<Self::Node>, i64)>;
    async fn count(&self) -> Result<i64>;
}

/// Cursor-paginated connection over a [`ConnectionLoader`].
///
/// The list call runs at most once per instance no matter how many of
/// `nodes`/`page_info` are invoked, and no matter how concurrently; the
/// count call likewise. A failure is cached and returned to every caller.
pub struct CursorConnection<L: ConnectionLoader> {
    loader: L,
    page: OnceCell<Result<(Vec<L::Node>, i64), SharedError>>,
    total: OnceCell<Result<i64, SharedError>>,
}

impl<L: ConnectionLoader> CursorConnection<L> {
    pub fn new(loader: L) -> Self {
        Self { loader, page: OnceCell::new(), total: OnceCell::new() }
    }

    async fn compute(&self) -> Result<&(Vec<L::Node>, i64), SharedError> {
        self.page
            .get_or_init(|| async { self.loader.list().await.map_err(SharedError::new) })
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The current page's items, in store order.
    pub async fn nodes(&self) -> Result<Vec<L::Node>> {
        Ok(self.compute().await?.0.clone())
    }

    /// The unpaginated total matching the connection's filters; independent
    /// of the page size.
    pub async fn total_count(&self) -> Result<i64> {
        self.total
            .get_or_init(|| async { self.loader.count().await.map_err(SharedError::new) })
            .await
            .clone()
            .map_err(Into::into)
    }

    pub async fn page_info(&self) -> Result<PageInfo> {
        let &(_, next_offset) = self.compute().await?;
        if next_offset != 0 {
            Ok(PageInfo::next(next_offset))
        } else {
            Ok(PageInfo::done())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrip() {
        for offset in [0, 1, 50, i64::MAX] {
            assert_eq!(unmarshal_cursor(&marshal_cursor(offset)).unwrap(), offset);
        }
    }

    #[test]
    fn malformed_cursor_is_an_error() {
        let err = unmarshal_cursor("opaque-but-wrong").unwrap_err();
        assert_eq!(
            err.downcast::<BatchesError>().unwrap(),
            BatchesError::MalformedCursor("opaque-but-wrong".to_string())
        );
    }

    #[test]
    fn page_args_decode_after_cursor() {
        assert_eq!(page_args(10, None).unwrap(), (10, 0));
        assert_eq!(page_args(10, Some("30")).unwrap(), (10, 30));
        assert!(page_args(10, Some("nope")).is_err());
    }
}
