//! NDJSON wire format.
//!
//! Each input line is one [`JobRequest`]:
//!
//! ```json
//! {"id": "post-1", "task": "summarize", "text": "...", "max_length": 120}
//! {"id": "post-1-tags", "task": "tags", "text": "...", "count": 3}
//! {"id": "comment-9", "task": "spam", "text": "..."}
//! {"id": "draft-2", "task": "content", "topic": "async Rust"}
//! ```
//!
//! Each output line is one [`JobResponse`].

use core::time::Duration;
use quill_tasks::{Error, Task, TaskKind, TaskOutput, TaskResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRequest {
    pub id: String,
    pub task: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Values applied when a request leaves an optional parameter out.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    pub summary_max_length: usize,
    pub tag_count: usize,
}

impl JobRequest {
    /// Resolves the task name and its parameters into a typed [`Task`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTaskType`] for an unrecognised task name and
    /// [`Error::InvalidRequest`] if a required field is missing.
    pub fn into_task(self, defaults: &RequestDefaults) -> Result<(String, Task), Error> {
        let kind: TaskKind = self.task.parse()?;
        let missing = |field: &str| Error::InvalidRequest {
            reason: format!("missing field `{field}` for {kind}"),
        };

        let task = match kind {
            TaskKind::Summarize => Task::Summarize {
                text: self.text.ok_or_else(|| missing("text"))?,
                max_length: self.max_length.unwrap_or(defaults.summary_max_length),
            },
            TaskKind::GenerateTags => Task::GenerateTags {
                text: self.text.ok_or_else(|| missing("text"))?,
                count: self.count.unwrap_or(defaults.tag_count),
            },
            TaskKind::DetectSpam => Task::DetectSpam {
                text: self.text.ok_or_else(|| missing("text"))?,
            },
            TaskKind::GenerateContent => Task::GenerateContent {
                topic: self.topic.ok_or_else(|| missing("topic"))?,
            },
        };

        Ok((self.id, task))
    }
}

/// A line that could not be turned into a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub id: Option<String>,
    pub reason: String,
}

/// Parses one input line into a correlation id and a task.
///
/// On failure, the id is still recovered when the line is valid JSON with a
/// string `id`, so the caller can correlate the error.
pub fn parse_line(line: &str, defaults: &RequestDefaults) -> Result<(String, Task), Rejected> {
    let request: JobRequest = serde_json::from_str(line).map_err(|e| Rejected {
        id: salvage_id(line),
        reason: format!("malformed request: {e}"),
    })?;

    let id = request.id.clone();
    request.into_task(defaults).map_err(|e| Rejected {
        id: Some(id),
        reason: e.to_string(),
    })
}

fn salvage_id(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResponse {
    pub id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResponse {
    pub fn rejected(id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(reason.into()),
        }
    }

    pub fn timed_out(id: String, after: Duration) -> Self {
        Self::rejected(
            Some(id),
            format!("no result within {}ms", after.as_millis()),
        )
    }
}

impl From<Rejected> for JobResponse {
    fn from(rejected: Rejected) -> Self {
        Self::rejected(rejected.id, rejected.reason)
    }
}

impl From<TaskResult> for JobResponse {
    fn from(result: TaskResult) -> Self {
        match result.outcome {
            Ok(output) => Self {
                id: Some(result.id),
                ok: true,
                data: Some(output_json(output)),
                error: None,
            },
            Err(e) => Self::rejected(Some(result.id), e.to_string()),
        }
    }
}

fn output_json(output: TaskOutput) -> Value {
    match output {
        TaskOutput::Summary(summary) => json!({ "summary": summary }),
        TaskOutput::Tags(tags) => json!({ "tags": tags }),
        TaskOutput::Spam(spam) => json!({ "spam": spam }),
        TaskOutput::Content(content) => json!({ "content": content }),
    }
}
