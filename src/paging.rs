//! One page sequence for both listing styles.
//!
//! Stores either hand back a continuation token with each page, or expose an
//! async cursor that yields pages on its own. [`Pages`] wraps either into the
//! same lazy, finite sequence. It ends after the last page or after the first
//! error, and cannot be restarted.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    Stream, StreamExt as _,
    stream::{self, BoxStream},
};

/// One page of a continuation-token listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub continuation: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            continuation: None,
        }
    }

    pub fn more(items: Vec<T>, continuation: C) -> Self {
        Self {
            items,
            continuation: Some(continuation),
        }
    }
}

enum Cursor<C> {
    Start,
    Resume(C),
    Done,
}

pub struct Pages<'a, T, E> {
    inner: BoxStream<'a, Result<Vec<T>, E>>,
}

impl<'a, T: Send + 'a, E: Send + 'a> Pages<'a, T, E> {
    /// Drive `fetch` with the token of the previous page until none is returned.
    ///
    /// An empty page that still carries a token does not end the sequence.
    pub fn continuation<C, F, Fut>(mut fetch: F) -> Self
    where
        C: Send + 'a,
        F: FnMut(Option<C>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Page<T, C>, E>> + Send + 'a,
    {
        let inner = stream::unfold(Cursor::Start, move |cursor| {
            let token = match cursor {
                Cursor::Start => Some(None),
                Cursor::Resume(token) => Some(Some(token)),
                Cursor::Done => None,
            };
            let next = token.map(&mut fetch);
            async move {
                match next?.await {
                    Ok(Page {
                        items,
                        continuation: Some(token),
                    }) => Some((Ok(items), Cursor::Resume(token))),
                    Ok(Page {
                        items,
                        continuation: None,
                    }) => Some((Ok(items), Cursor::Done)),
                    Err(error) => Some((Err(error), Cursor::Done)),
                }
            }
        });
        Self {
            inner: inner.boxed(),
        }
    }

    /// Adopt a store-provided cursor. Pages after the first error are dropped.
    pub fn cursor(pages: impl Stream<Item = Result<Vec<T>, E>> + Send + 'a) -> Self {
        let inner = pages
            .scan(false, |failed, page| {
                let emit = (!*failed).then(|| {
                    *failed = page.is_err();
                    page
                });
                async move { emit }
            })
            .fuse();
        Self {
            inner: inner.boxed(),
        }
    }

    pub fn empty() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }

    pub async fn next_page(&mut self) -> Option<Result<Vec<T>, E>> {
        self.inner.next().await
    }
}

impl<T, E> Stream for Pages<'_, T, E> {
    type Item = Result<Vec<T>, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::TryStreamExt as _;

    use super::*;

    #[tokio::test]
    async fn follows_tokens_through_empty_pages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let pages = Pages::<u32, ()>::continuation(move |token: Option<u32>| {
            log.lock().unwrap().push(token);
            async move {
                Ok(match token {
                    None => Page::more(vec![1, 2], 1),
                    Some(1) => Page::more(vec![], 2),
                    Some(2) => Page::more(vec![], 3),
                    _ => Page::last(vec![3]),
                })
            }
        });
        let all = pages.try_concat().await.unwrap();
        assert_eq!(all, [1, 2, 3]);
        assert_eq!(*seen.lock().unwrap(), [None, Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn stops_after_error() {
        let mut calls = 0;
        let mut pages = Pages::<u32, &str>::continuation(move |_: Option<u32>| {
            calls += 1;
            let call = calls;
            async move {
                if call == 1 {
                    Ok(Page::more(vec![1], 1))
                } else {
                    Err("boom")
                }
            }
        });
        assert_eq!(pages.next_page().await, Some(Ok(vec![1])));
        assert_eq!(pages.next_page().await, Some(Err("boom")));
        assert_eq!(pages.next_page().await, None);
    }

    #[tokio::test]
    async fn cursor_ends_at_first_error() {
        let source = stream::iter(vec![Ok(vec![1]), Err("bad"), Ok(vec![2])]);
        let collected = Pages::<u32, &str>::cursor(source).collect::<Vec<_>>().await;
        assert_eq!(collected, [Ok(vec![1]), Err("bad")]);
    }
}
