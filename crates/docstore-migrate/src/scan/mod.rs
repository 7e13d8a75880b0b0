//! Cursor-paged scan over one collection.

use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::debug;

use crate::core::{CollectionRef, Document, DocumentStore, ScanCursor};
use crate::error::Result;

/// Lazy, restartable sequence of document batches.
///
/// The cursor only advances after a page was fetched successfully, so a
/// failed call to [`PagedScanner::next_batch`] can simply be repeated.
pub struct PagedScanner {
    store: Arc<dyn DocumentStore>,
    collection: CollectionRef,
    page_size: usize,
    cursor: Option<ScanCursor>,
    finished: bool,
    pages_read: u64,
}

impl PagedScanner {
    /// Scanner starting at the beginning of the collection.
    pub fn new(store: Arc<dyn DocumentStore>, collection: CollectionRef, page_size: usize) -> Self {
        Self {
            store,
            collection,
            page_size: page_size.max(1),
            cursor: None,
            finished: false,
            pages_read: 0,
        }
    }

    /// Continue a previous scan from a saved cursor.
    pub fn resume_from(mut self, cursor: Option<ScanCursor>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Cursor of the next page to be requested (`None` before the first page).
    pub fn cursor(&self) -> Option<&ScanCursor> {
        self.cursor.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// Fetch the next page. `Ok(None)` once the store reported no cursor.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        if self.finished {
            return Ok(None);
        }

        let page = self
            .store
            .scan_page(&self.collection, self.cursor.as_ref(), self.page_size)
            .await?;

        self.pages_read += 1;
        debug!(
            "{}: page {} returned {} document(s), more: {}",
            self.collection,
            self.pages_read,
            page.documents.len(),
            page.next_cursor.is_some()
        );

        match page.next_cursor {
            Some(next) => self.cursor = Some(next),
            None => self.finished = true,
        }

        Ok(Some(page.documents))
    }

    /// Consume the scanner as a stream of batches. The stream ends after the
    /// last page or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Document>>> {
        stream::try_unfold(self, |mut scanner| async move {
            let batch = scanner.next_batch().await?;
            Ok(batch.map(|docs| (docs, scanner)))
        })
    }
}
