use anyhow::Result;
use log::debug;

/// One staged content mutation: stamps a component with the version's
/// effective time and marks it released
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
    pub component_id: String,
    pub effective_time: i32,
    pub released: bool,
}

impl ContentChange {
    pub fn publish(component_id: impl Into<String>, effective_time: i32) -> Self {
        Self {
            component_id: component_id.into(),
            effective_time,
            released: true,
        }
    }
}

/// A logical transaction over one content repository. Implemented by the
/// storage engine; the versioning core only consumes it.
#[async_trait::async_trait]
pub trait ContentTransaction: Send {
    /// Writes a batch of staged changes into the transaction
    async fn apply(&mut self, changes: &[ContentChange]) -> Result<()>;
    /// Commits everything applied since the previous commit, returning the
    /// commit identifier
    async fn commit(&mut self, author: &str, comment: &str, timestamp: &str) -> Result<String>;
}

/// Invoked after every batch commit with the resulting commit identifier
pub type CommitCallback = Box<dyn Fn(&str) + Send>;

/// Wraps a [`ContentTransaction`] and forces it to commit in bounded-size
/// batches instead of one unbounded commit.
///
/// Staged changes are buffered; when the buffer reaches the low watermark the
/// batch is committed and the on-commit callback fires. Every batch carries
/// the same author and comment, so the whole run still reads as one logical
/// commit. [`CappedTransactionContext::close`] flushes whatever remains.
pub struct CappedTransactionContext {
    transaction: Box<dyn ContentTransaction>,
    low_watermark: usize,
    author: String,
    comment: String,
    timestamp: String,
    buffer: Vec<ContentChange>,
    on_commit: Option<CommitCallback>,
    commit_count: usize,
    last_commit: Option<String>,
}

impl CappedTransactionContext {
    pub fn new(
        transaction: Box<dyn ContentTransaction>,
        low_watermark: usize,
        author: impl Into<String>,
        comment: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            transaction,
            low_watermark: low_watermark.max(1),
            author: author.into(),
            comment: comment.into(),
            timestamp: timestamp.into(),
            buffer: Vec::new(),
            on_commit: None,
            commit_count: 0,
            last_commit: None,
        }
    }

    pub fn with_commit_callback(mut self, callback: CommitCallback) -> Self {
        self.on_commit = Some(callback);
        self
    }

    /// Stages one change, force-committing the buffered batch when the low
    /// watermark is reached
    pub async fn stage(&mut self, change: ContentChange) -> Result<()> {
        self.buffer.push(change);
        if self.buffer.len() >= self.low_watermark {
            self.flush().await?;
        }
        Ok(())
    }

    /// Number of batch commits performed so far
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Commits any remaining buffered changes and returns the identifier of
    /// the final commit, if any commit happened at all
    pub async fn close(mut self) -> Result<Option<String>> {
        self.flush().await?;
        Ok(self.last_commit)
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.transaction.apply(&self.buffer).await?;
        let commit_id = self
            .transaction
            .commit(&self.author, &self.comment, &self.timestamp)
            .await?;
        debug!(
            "Committed batch of {} change(s) as {}",
            self.buffer.len(),
            commit_id
        );
        self.buffer.clear();
        self.commit_count += 1;
        if let Some(callback) = &self.on_commit {
            callback(&commit_id);
        }
        self.last_commit = Some(commit_id);
        Ok(())
    }
}
