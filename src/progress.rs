//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::LarderConfigBuilder::progress_callback`] to receive
//! events while [`crate::ingest::Pipeline::reprocess_corpus`] works through
//! the recipe corpus. The CLI forwards them to a terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use larder::{BatchProgressCallback, LarderConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_item_complete(&self, _index: usize, _total: usize, name: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("re-extracted {name}");
//!     }
//! }
//!
//! let config = LarderConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch pipeline as it processes each item.
///
/// Items run concurrently, so `on_item_*` may be called from several tasks
/// at once. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item starts, with the number of items that
    /// will actually be processed (skipped items excluded).
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an item's first external call. `index` is 0-based.
    fn on_item_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an item produced a record.
    fn on_item_complete(&self, index: usize, total: usize, recipe_name: &str) {
        let _ = (index, total, recipe_name);
    }

    /// Called when an item failed; the batch continues.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every item has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::LarderConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
