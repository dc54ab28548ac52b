use serde_json::Value;
use tracing::trace;

use crate::task::{
  ClassifyInput,
  Task,
  TaskStatus
};

/// Colour family for status badges.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Variant {
  Info,
  Default,
  Danger,
  Warning,
  Success
}

impl Variant {
  #[must_use]
  pub fn for_status(
    status: &TaskStatus
  ) -> Self {
    match status {
      | TaskStatus::Started
      | TaskStatus::Dispatched => {
        Self::Info
      }
      | TaskStatus::Failed => {
        Self::Danger
      }
      | TaskStatus::Cancelled => {
        Self::Warning
      }
      | TaskStatus::Success => {
        Self::Success
      }
      | TaskStatus::Undispatched
      | TaskStatus::Other(_)
      | TaskStatus::Missing => {
        Self::Default
      }
    }
  }

  #[must_use]
  pub fn as_str(&self) -> &'static str {
    match self {
      | Self::Info => "info",
      | Self::Default => "default",
      | Self::Danger => "danger",
      | Self::Warning => "warning",
      | Self::Success => "success"
    }
  }
}

/// `{kind}-{variant}`, e.g. `btn-danger` for a failed task.
#[must_use]
pub fn badge_label(
  status: &TaskStatus,
  kind: &str
) -> String {
  format!(
    "{kind}-{}",
    Variant::for_status(status)
      .as_str()
  )
}

/// Status class for a task record. Primitives are assumed to be classified
/// already and come back unchanged.
#[must_use]
pub fn classify(
  input: &ClassifyInput
) -> Value {
  match input {
    | ClassifyInput::Record(task) => {
      Value::String(classify_task(task))
    }
    | ClassifyInput::Primitive(
      value
    ) => value.clone()
  }
}

#[must_use]
pub fn classify_task(
  task: &Task
) -> String {
  let class = match &task.status {
    | TaskStatus::Undispatched => {
      if task.activated {
        "unstarted"
      } else {
        "inactive"
      }
    }
    | TaskStatus::Started => "started",
    | TaskStatus::Success => "success",
    | TaskStatus::Failed => {
      if task
        .ended_with_system_failure()
      {
        "system-failed"
      } else {
        "failed"
      }
    }
    | other => other.as_str()
  };
  trace!(status = %task.status, class, "classified task");
  class.to_string()
}

/// Human-readable status label.
#[must_use]
pub fn describe(task: &Task) -> String {
  let label = match &task.status {
    | TaskStatus::Started => {
      Some("started")
    }
    | TaskStatus::Undispatched
      if task.activated =>
    {
      Some("scheduled")
    }
    | TaskStatus::Undispatched
      if task.dispatch_unset() =>
    {
      Some("not scheduled")
    }
    | TaskStatus::Undispatched => {
      Some("aborted")
    }
    | TaskStatus::Success => {
      Some("success")
    }
    | TaskStatus::Failed => {
      failure_label(task)
    }
    | _ => None
  };

  // A failed task without end details has no rule of its own and reports
  // its raw status.
  label
    .map(str::to_string)
    .unwrap_or_else(|| {
      task.status.as_str().to_string()
    })
}

fn failure_label(
  task: &Task
) -> Option<&'static str> {
  let details =
    task.task_end_details.as_ref()?;
  if details.timed_out {
    if details.desc.as_deref()
      == Some("heartbeat")
    {
      return Some("unresponsive");
    }
    return Some("timed out");
  }
  Some("failed")
}
