//! Fan-out list pagination across multiple upstreams (spec §4.3).
//!
//! Two modes, selected per-session:
//!   - disabled (default): drain every page of every visible upstream and
//!     concatenate into one unpaginated response.
//!   - enabled: return exactly one upstream's one page per call, encoding
//!     "which upstream, at what position" into the outgoing cursor.

use super::cursor::{decode_or_fallback, encode, Cursor};
use crate::error::ProxyResult;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    Disabled,
    Enabled,
}

/// One fetched page: the items plus the upstream's own opaque `nextCursor`
/// (`None` means that upstream has no more pages).
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_upstream_cursor: Option<String>,
}

/// Drain every page of every upstream in `visible_upstreams`, in order,
/// concatenating results. Used when pagination is disabled for the session.
pub async fn drain_all<T, F, Fut>(visible_upstreams: &[String], mut fetch_page: F) -> ProxyResult<Vec<T>>
where
    F: FnMut(&str, Option<String>) -> Fut,
    Fut: Future<Output = ProxyResult<Page<T>>>,
{
    let mut all = Vec::new();
    for upstream in visible_upstreams {
        let mut upstream_cursor = None;
        loop {
            let page = fetch_page(upstream, upstream_cursor.clone()).await?;
            all.extend(page.items);
            match page.next_upstream_cursor {
                Some(next) => upstream_cursor = Some(next),
                None => break,
            }
        }
    }
    Ok(all)
}

/// Fetch exactly one page, resuming from `incoming_cursor` (or the first
/// visible upstream if absent/invalid), and produce the outgoing cursor.
/// Returns `(items, next_cursor)`; `next_cursor` is `None` once every
/// visible upstream has been exhausted.
pub async fn fetch_one_page<T, F, Fut>(
    visible_upstreams: &[String],
    incoming_cursor: Option<&str>,
    mut fetch_page: F,
) -> ProxyResult<(Vec<T>, Option<String>)>
where
    F: FnMut(&str, Option<String>) -> Fut,
    Fut: Future<Output = ProxyResult<Page<T>>>,
{
    if visible_upstreams.is_empty() {
        return Ok((Vec::new(), None));
    }

    let Cursor { upstream, upstream_cursor } = decode_or_fallback(incoming_cursor, &visible_upstreams[0]);

    let Some(pos) = visible_upstreams.iter().position(|u| u == &upstream) else {
        // the cursor names an upstream that's no longer visible (removed,
        // or filtered out by this session's tag query) — restart clean.
        let fallback = decode_or_fallback(None, &visible_upstreams[0]);
        return fetch_one_page_from(visible_upstreams, 0, fallback.upstream_cursor, &mut fetch_page).await;
    };

    let upstream_cursor = if upstream_cursor.is_empty() { None } else { Some(upstream_cursor) };
    fetch_one_page_from(visible_upstreams, pos, upstream_cursor.unwrap_or_default(), &mut fetch_page).await
}

async fn fetch_one_page_from<T, F, Fut>(
    visible_upstreams: &[String],
    start_pos: usize,
    start_cursor: String,
    fetch_page: &mut F,
) -> ProxyResult<(Vec<T>, Option<String>)>
where
    F: FnMut(&str, Option<String>) -> Fut,
    Fut: Future<Output = ProxyResult<Page<T>>>,
{
    let upstream = &visible_upstreams[start_pos];
    let cursor_arg = if start_cursor.is_empty() { None } else { Some(start_cursor) };
    let page = fetch_page(upstream, cursor_arg).await?;

    let next_cursor = match page.next_upstream_cursor {
        Some(next) => Some(encode(&Cursor { upstream: upstream.clone(), upstream_cursor: next })),
        None => {
            let next_pos = start_pos + 1;
            if next_pos < visible_upstreams.len() {
                Some(encode(&Cursor { upstream: visible_upstreams[next_pos].clone(), upstream_cursor: String::new() }))
            } else {
                None
            }
        }
    };

    Ok((page.items, next_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstreams() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    async fn fetch(upstream: &str, cursor: Option<String>) -> ProxyResult<Page<String>> {
        // each upstream has exactly 2 items split across 2 pages
        let items = match (upstream, cursor.as_deref()) {
            ("a", None) => Page { items: vec!["a1".into()], next_upstream_cursor: Some("p2".into()) },
            ("a", Some("p2")) => Page { items: vec!["a2".into()], next_upstream_cursor: None },
            ("b", None) => Page { items: vec!["b1".into()], next_upstream_cursor: None },
            ("c", None) => Page { items: vec!["c1".into()], next_upstream_cursor: None },
            _ => Page { items: vec![], next_upstream_cursor: None },
        };
        Ok(items)
    }

    #[tokio::test]
    async fn drain_all_concatenates_every_page_of_every_upstream() {
        let all: Vec<String> = drain_all(&upstreams(), fetch).await.unwrap();
        assert_eq!(all, vec!["a1", "a2", "b1", "c1"]);
    }

    #[tokio::test]
    async fn fetch_one_page_advances_across_upstreams() {
        let (items1, cursor1) = fetch_one_page(&upstreams(), None, fetch).await.unwrap();
        assert_eq!(items1, vec!["a1"]);
        let cursor1 = cursor1.unwrap();

        let (items2, cursor2) = fetch_one_page(&upstreams(), Some(&cursor1), fetch).await.unwrap();
        assert_eq!(items2, vec!["a2"]);
        let cursor2 = cursor2.unwrap();

        let (items3, cursor3) = fetch_one_page(&upstreams(), Some(&cursor2), fetch).await.unwrap();
        assert_eq!(items3, vec!["b1"]);
        let cursor3 = cursor3.unwrap();

        let (items4, cursor4) = fetch_one_page(&upstreams(), Some(&cursor3), fetch).await.unwrap();
        assert_eq!(items4, vec!["c1"]);
        assert!(cursor4.is_none());
    }

    #[tokio::test]
    async fn fetch_one_page_falls_back_to_first_upstream_on_bad_cursor() {
        let (items, _) = fetch_one_page(&upstreams(), Some("garbage!!"), fetch).await.unwrap();
        assert_eq!(items, vec!["a1"]);
    }

    #[tokio::test]
    async fn fetch_one_page_on_empty_visible_set_returns_empty() {
        let (items, cursor) = fetch_one_page::<String, _, _>(&[], None, fetch).await.unwrap();
        assert!(items.is_empty());
        assert!(cursor.is_none());
    }
}
