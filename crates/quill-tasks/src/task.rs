//! Job and result data model.
//!
//! A [`Job`] couples a caller-chosen correlation id and a typed [`Task`] with
//! the caller's own result channel. Workers answer every job with exactly one
//! [`TaskResult`] attempt on that channel.
//!
//! The set of task kinds is closed: [`Task::run`] matches exhaustively, so a
//! worker can never receive a job it does not know how to dispatch. Names are
//! only parsed at the edges via [`TaskKind`]'s [`FromStr`] impl.

use crate::{Error, GenerationBackend, backend::BackendResult};
use core::{fmt, str::FromStr};
use tokio::sync::mpsc;

/// Typed input for one unit of generation work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task {
    /// Condense `text` to at most `max_length` characters.
    Summarize { text: String, max_length: usize },
    /// Produce up to `count` tags describing `text`.
    GenerateTags { text: String, count: usize },
    /// Classify `text` as spam or not.
    DetectSpam { text: String },
    /// Draft post content about `topic`.
    GenerateContent { topic: String },
}

impl Task {
    pub const fn kind(&self) -> TaskKind {
        match self {
            Self::Summarize { .. } => TaskKind::Summarize,
            Self::GenerateTags { .. } => TaskKind::GenerateTags,
            Self::DetectSpam { .. } => TaskKind::DetectSpam,
            Self::GenerateContent { .. } => TaskKind::GenerateContent,
        }
    }

    /// Invokes the backend method for this task and wraps its output.
    ///
    /// Runs synchronously on the calling thread; callers on an async runtime
    /// should move this onto a blocking thread.
    pub fn run(&self, backend: &dyn GenerationBackend) -> BackendResult<TaskOutput> {
        match self {
            Self::Summarize { text, max_length } => {
                backend.summarize(text, *max_length).map(TaskOutput::Summary)
            }
            Self::GenerateTags { text, count } => {
                backend.generate_tags(text, *count).map(TaskOutput::Tags)
            }
            Self::DetectSpam { text } => backend.detect_spam(text).map(TaskOutput::Spam),
            Self::GenerateContent { topic } => {
                backend.generate_content(topic).map(TaskOutput::Content)
            }
        }
    }
}

/// Field-less tag identifying the kind of a [`Task`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Summarize,
    GenerateTags,
    DetectSpam,
    GenerateContent,
}

impl TaskKind {
    pub const ALL: [Self; 4] = [
        Self::Summarize,
        Self::GenerateTags,
        Self::DetectSpam,
        Self::GenerateContent,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::GenerateTags => "generate_tags",
            Self::DetectSpam => "detect_spam",
            Self::GenerateContent => "generate_content",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    /// Accepts the canonical names plus the short aliases used by older
    /// clients (`summary`, `tags`, `spam`, `content`). Matching is
    /// case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summarize" | "summary" => Ok(Self::Summarize),
            "generate_tags" | "tags" => Ok(Self::GenerateTags),
            "detect_spam" | "spam" => Ok(Self::DetectSpam),
            "generate_content" | "content" => Ok(Self::GenerateContent),
            _ => Err(Error::UnknownTaskType(s.to_string())),
        }
    }
}

/// Successful output of a task. The variant always matches the job's
/// [`TaskKind`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutput {
    Summary(String),
    Tags(Vec<String>),
    Spam(bool),
    Content(String),
}

/// The outcome of one job, correlated by id.
///
/// Holding a `Result` makes data and error mutually exclusive by
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult {
    pub id: String,
    pub outcome: Result<TaskOutput, Error>,
}

impl TaskResult {
    pub fn success(id: impl Into<String>, output: TaskOutput) -> Self {
        Self {
            id: id.into(),
            outcome: Ok(output),
        }
    }

    pub fn failure(id: impl Into<String>, error: Error) -> Self {
        Self {
            id: id.into(),
            outcome: Err(error),
        }
    }

    pub fn data(&self) -> Option<&TaskOutput> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// One unit of work travelling through the queue.
///
/// `reply` belongs to the submitter. The service only sends on it and never
/// closes it; dropping the receiver is how a caller abandons a job.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub task: Task,
    pub reply: mpsc::Sender<TaskResult>,
}

impl Job {
    pub const fn kind(&self) -> TaskKind {
        self.task.kind()
    }
}
