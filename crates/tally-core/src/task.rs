use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::datetime::{Clock, elapsed_millis, lenient_instant};

/// Task status as reported by the backend. Values outside the known set are
/// kept verbatim so they can be passed through to the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum TaskStatus {
    Started,
    Undispatched,
    Dispatched,
    Failed,
    Cancelled,
    Success,
    Other(String),
    #[default]
    Missing,
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "started" => Self::Started,
            "undispatched" => Self::Undispatched,
            "dispatched" => Self::Dispatched,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "success" => Self::Success,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => "started",
            Self::Undispatched => "undispatched",
            Self::Dispatched => "dispatched",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Success => "success",
            Self::Other(raw) => raw,
            Self::Missing => "",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Value> for TaskStatus {
    fn from(value: Value) -> Self {
        match value {
            Value::String(raw) => Self::parse(&raw),
            Value::Null => Self::Missing,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Failure detail attached to a finished task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEndDetails {
    #[serde(default, rename = "type", deserialize_with = "lenient::string")]
    pub kind: Option<String>,

    #[serde(default, deserialize_with = "lenient::truthy")]
    pub timed_out: bool,

    #[serde(default, deserialize_with = "lenient::string")]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, deserialize_with = "lenient::truthy")]
    pub activated: bool,

    #[serde(default, deserialize_with = "lenient::dispatch_time")]
    pub dispatch_time: Option<String>,

    #[serde(default, deserialize_with = "lenient::end_details")]
    pub task_end_details: Option<TaskEndDetails>,

    #[serde(default, with = "lenient_instant")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, with = "lenient_instant")]
    pub finish_time: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

pub const UNSET_DISPATCH_TIME: &str = "0";

impl Task {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// True only for the explicit `"0"` sentinel. A missing dispatch time
    /// counts as set.
    pub fn dispatch_unset(&self) -> bool {
        self.dispatch_time.as_deref() == Some(UNSET_DISPATCH_TIME)
    }

    pub fn ended_with_system_failure(&self) -> bool {
        self.task_end_details
            .as_ref()
            .and_then(|details| details.kind.as_deref())
            == Some("system")
    }

    /// Builds a task from a JSON object without failing. Every field is read
    /// leniently, so the fallback only keeps the status.
    pub fn from_record(map: Map<String, Value>) -> Self {
        let status = map.get("status").cloned().map(TaskStatus::from).unwrap_or_default();
        serde_json::from_value(Value::Object(map)).unwrap_or_else(|err| {
            warn!(error = %err, "unreadable task record; keeping status only");
            Self::with_status(status)
        })
    }

    pub fn elapsed_millis(&self, clock: &dyn Clock) -> i64 {
        elapsed_millis(self.start_time, self.finish_time, Some(clock.now()))
    }
}

/// Input to the status-class filter: either a task record or an already
/// classified primitive that is passed through untouched.
///
/// Only JSON objects are records. Arrays pass through like any other
/// non-object value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClassifyInput {
    Record(Task),
    Primitive(Value),
}

impl From<Value> for ClassifyInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Record(Task::from_record(map)),
            other => Self::Primitive(other),
        }
    }
}

impl<'de> Deserialize<'de> for ClassifyInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from)
    }
}

impl From<Task> for ClassifyInput {
    fn from(task: Task) -> Self {
        Self::Record(task)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildTaskInfo {
    #[serde(default, rename = "Status")]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildTask {
    #[serde(default, rename = "Task")]
    pub task: BuildTaskInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    #[serde(default, rename = "Tasks")]
    pub tasks: Vec<BuildTask>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Build {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TaskStatus>,
    {
        Self {
            tasks: statuses
                .into_iter()
                .map(|status| BuildTask {
                    task: BuildTaskInfo { status },
                })
                .collect(),
            extra: BTreeMap::new(),
        }
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => false,
            Value::Bool(flag) => flag,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        })
    }

    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn end_details<'de, D>(deserializer: D) -> Result<Option<super::TaskEndDetails>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            details @ Value::Object(_) => serde_json::from_value(details).ok(),
            _ => None,
        })
    }

    pub fn dispatch_time<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(super::UNSET_DISPATCH_TIME.to_string()),
            other => Some(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Build, ClassifyInput, Task, TaskStatus};

    #[test]
    fn unknown_status_is_kept_verbatim() {
        let task: Task = serde_json::from_value(json!({"status": "blocked"})).expect("task");
        assert_eq!(task.status, TaskStatus::Other("blocked".to_string()));
        assert_eq!(task.status.as_str(), "blocked");
    }

    #[test]
    fn lenient_fields_accept_loose_json() {
        let task: Task = serde_json::from_value(json!({
            "status": "undispatched",
            "activated": null,
            "dispatch_time": 0,
            "task_end_details": {"timed_out": 1}
        }))
        .expect("task");

        assert!(!task.activated);
        assert!(task.dispatch_unset());
        assert!(task.task_end_details.expect("details").timed_out);
    }

    #[test]
    fn missing_dispatch_time_is_not_the_sentinel() {
        let task: Task = serde_json::from_value(json!({"status": "undispatched"})).expect("task");
        assert!(!task.dispatch_unset());
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let task: Task =
            serde_json::from_value(json!({"status": "success", "build_variant": "linux"})).expect("task");
        assert_eq!(task.extra.get("build_variant"), Some(&json!("linux")));
    }

    #[test]
    fn classify_input_distinguishes_records_from_primitives() {
        let record: ClassifyInput = serde_json::from_value(json!({"status": "failed"})).expect("record");
        assert!(matches!(record, ClassifyInput::Record(_)));

        let primitive: ClassifyInput = serde_json::from_value(json!("pass")).expect("primitive");
        assert_eq!(primitive, ClassifyInput::Primitive(json!("pass")));
    }

    #[test]
    fn mistyped_incidental_fields_read_as_absent() {
        let task: Task = serde_json::from_value(json!({
            "id": 42,
            "display_name": ["compile"],
            "status": "failed",
            "task_end_details": {"type": "system", "desc": 5}
        }))
        .expect("task");

        assert_eq!(task.id, None);
        assert_eq!(task.display_name, None);
        let details = task.task_end_details.expect("details");
        assert_eq!(details.kind.as_deref(), Some("system"));
        assert_eq!(details.desc, None);
    }

    #[test]
    fn non_object_end_details_are_dropped() {
        let task: Task =
            serde_json::from_value(json!({"status": "failed", "task_end_details": "n/a"})).expect("task");
        assert_eq!(task.task_end_details, None);
    }

    #[test]
    fn objects_are_always_records() {
        let input: ClassifyInput = serde_json::from_value(json!({
            "id": 42,
            "status": "undispatched",
            "task_end_details": "n/a"
        }))
        .expect("record");

        match input {
            ClassifyInput::Record(task) => assert_eq!(task.status, TaskStatus::Undispatched),
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn arrays_pass_through_as_primitives() {
        let input: ClassifyInput = serde_json::from_value(json!(["failed"])).expect("array");
        assert_eq!(input, ClassifyInput::Primitive(json!(["failed"])));
    }

    #[test]
    fn build_reads_backend_casing() {
        let build: Build = serde_json::from_value(json!({
            "Tasks": [{"Task": {"Status": "success"}}, {"Task": {}}]
        }))
        .expect("build");

        assert_eq!(build.tasks.len(), 2);
        assert_eq!(build.tasks[0].task.status, TaskStatus::Success);
        assert_eq!(build.tasks[1].task.status, TaskStatus::Missing);
    }
}
