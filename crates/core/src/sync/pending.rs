//! Paged stream of pending log entries

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use metasync_domain::{LogEntry, MetaSyncError, Result};

use super::ports::EventSource;

#[derive(Debug, Clone, Copy)]
enum Cursor {
    Start,
    After(i64),
    Exhausted,
}

/// Stream every pending entry once, fetching `page_size` entries at a time.
///
/// Pages are keyed on the last id seen rather than an offset, so entries
/// marked while the stream is consumed do not shift later pages and entries
/// left pending are not returned twice.
pub fn pending_entries(
    source: Arc<dyn EventSource>,
    page_size: usize,
) -> impl Stream<Item = Result<LogEntry>> + Send {
    let page_size = page_size.max(1);

    stream::try_unfold(Cursor::Start, move |cursor| {
        let source = Arc::clone(&source);
        async move {
            let after = match cursor {
                Cursor::Start => None,
                Cursor::After(id) => Some(id),
                Cursor::Exhausted => return Ok(None),
            };

            let page = source.select_pending(after, page_size).await?;
            let next = match page.last() {
                Some(last) if page.len() >= page_size => Cursor::After(last.id),
                Some(_) => Cursor::Exhausted,
                None => return Ok(None),
            };
            Ok(Some((stream::iter(page.into_iter().map(Ok::<_, MetaSyncError>)), next)))
        }
    })
    .try_flatten()
}
