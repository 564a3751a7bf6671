use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Args;
use pubstore::{Progress, PublishError, PublishedStorage};

#[derive(Args, Debug, Clone)]
pub struct Rmdir {
    /// Directory to remove recursively
    pub path: String,
}

/// Logs removal progress.
///
/// Entries are counted as processed whether or not their delete succeeded;
/// failures come back from `remove_dirs` as one aggregate error.
#[derive(Debug, Default)]
struct LogProgress {
    total: AtomicUsize,
    processed: AtomicUsize,
}

impl Progress for LogProgress {
    fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        tracing::info!(total, "removing files");
    }

    fn advance(&self, path: &str) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(path = %path, processed, total = self.total.load(Ordering::Relaxed), "processed");
    }

    fn finish(&self) {
        tracing::info!(processed = self.processed.load(Ordering::Relaxed), "removal finished");
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Rmdir {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let storage = ctx.storage().await?;
        let progress = LogProgress::default();
        storage.remove_dirs(&self.path, Some(&progress)).await?;
        Ok(format!(
            "processed {} file(s) under {}/{}",
            progress.processed.load(Ordering::Relaxed),
            storage,
            self.path
        ))
    }
}
