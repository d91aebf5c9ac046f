//! The generation backend boundary.
//!
//! Workers treat the backend as an opaque, synchronous callable. It may block
//! on network I/O and is trusted to enforce its own timeouts; the pool only
//! makes sure a slow or panicking call never takes a worker down with it.

use crate::BackendError;
use std::sync::Arc;

pub type BackendResult<T> = core::result::Result<T, BackendError>;

/// Synchronous content-generation operations invoked by workers.
///
/// Implementations must be shareable across worker threads. Every method may
/// fail for any reason; the error is forwarded to the job's caller untouched.
pub trait GenerationBackend: Send + Sync + 'static {
    /// Summarizes `text` in at most `max_length` characters.
    fn summarize(&self, text: &str, max_length: usize) -> BackendResult<String>;

    /// Generates up to `count` tags for `text`.
    fn generate_tags(&self, text: &str, count: usize) -> BackendResult<Vec<String>>;

    /// Returns `true` if `text` looks like spam.
    fn detect_spam(&self, text: &str) -> BackendResult<bool>;

    /// Drafts post content about `topic`.
    ///
    /// Optional; backends that cannot generate long-form content keep the
    /// default, which reports [`BackendError::Unsupported`].
    fn generate_content(&self, _topic: &str) -> BackendResult<String> {
        Err(BackendError::Unsupported {
            operation: "generate_content",
        })
    }
}

impl<B: GenerationBackend + ?Sized> GenerationBackend for Arc<B> {
    fn summarize(&self, text: &str, max_length: usize) -> BackendResult<String> {
        (**self).summarize(text, max_length)
    }

    fn generate_tags(&self, text: &str, count: usize) -> BackendResult<Vec<String>> {
        (**self).generate_tags(text, count)
    }

    fn detect_spam(&self, text: &str) -> BackendResult<bool> {
        (**self).detect_spam(text)
    }

    fn generate_content(&self, topic: &str) -> BackendResult<String> {
        (**self).generate_content(topic)
    }
}

impl<B: GenerationBackend + ?Sized> GenerationBackend for Box<B> {
    fn summarize(&self, text: &str, max_length: usize) -> BackendResult<String> {
        (**self).summarize(text, max_length)
    }

    fn generate_tags(&self, text: &str, count: usize) -> BackendResult<Vec<String>> {
        (**self).generate_tags(text, count)
    }

    fn detect_spam(&self, text: &str) -> BackendResult<bool> {
        (**self).detect_spam(text)
    }

    fn generate_content(&self, topic: &str) -> BackendResult<String> {
        (**self).generate_content(topic)
    }
}

/// Rejects blank input before it reaches the wrapped backend.
///
/// Blank `text` or `topic` fails with [`BackendError::InvalidInput`], a zero
/// `max_length` is an error and a zero tag `count` yields no tags without a
/// backend call.
#[derive(Clone, Debug, Default)]
pub struct ValidatingBackend<B> {
    inner: B,
}

impl<B> ValidatingBackend<B> {
    pub const fn new(inner: B) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

fn require_content(text: &str, what: &str) -> BackendResult<()> {
    if text.trim().is_empty() {
        return Err(BackendError::InvalidInput {
            reason: format!("{what} cannot be empty"),
        });
    }
    Ok(())
}

impl<B: GenerationBackend> GenerationBackend for ValidatingBackend<B> {
    fn summarize(&self, text: &str, max_length: usize) -> BackendResult<String> {
        require_content(text, "content")?;
        if max_length == 0 {
            return Err(BackendError::InvalidInput {
                reason: "max_length must be greater than 0".to_string(),
            });
        }
        self.inner.summarize(text, max_length)
    }

    fn generate_tags(&self, text: &str, count: usize) -> BackendResult<Vec<String>> {
        require_content(text, "content")?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.inner.generate_tags(text, count)
    }

    fn detect_spam(&self, text: &str) -> BackendResult<bool> {
        require_content(text, "content")?;
        self.inner.detect_spam(text)
    }

    fn generate_content(&self, topic: &str) -> BackendResult<String> {
        require_content(topic, "topic")?;
        self.inner.generate_content(topic)
    }
}
