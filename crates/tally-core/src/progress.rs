use serde::Serialize;
use tracing::debug;

use crate::task::{
  Build,
  TaskStatus
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
  Success,
  Failed,
  Started,
  Neither
}

impl Bucket {
  pub const ALL: [Bucket; 4] = [
    Bucket::Success,
    Bucket::Failed,
    Bucket::Started,
    Bucket::Neither
  ];

  #[must_use]
  pub fn for_status(
    status: &TaskStatus
  ) -> Self {
    match status {
      | TaskStatus::Success => {
        Self::Success
      }
      | TaskStatus::Failed => {
        Self::Failed
      }
      | TaskStatus::Started => {
        Self::Started
      }
      | _ => Self::Neither
    }
  }

  #[must_use]
  pub fn phrase(&self) -> &'static str {
    match self {
      | Self::Success => "succeeded",
      | Self::Failed => "failed",
      | Self::Started => "in progress",
      | Self::Neither => {
        "not started or cancelled"
      }
    }
  }

  #[must_use]
  pub fn css_class(
    &self
  ) -> &'static str {
    match self {
      | Self::Success => {
        "progress-bar progress-bar-success"
      }
      | Self::Failed => {
        "progress-bar progress-bar-danger"
      }
      | Self::Started => {
        "progress-bar progress-bar-warning"
      }
      | Self::Neither => {
        "progress-bar progress-bar-default"
      }
    }
  }
}

/// Per-bucket task counts for one build.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct BuildTally {
  pub success: usize,
  pub failed:  usize,
  pub started: usize,
  pub neither: usize
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSegment {
  pub bucket:    Bucket,
  pub count:     usize,
  pub css_class: &'static str,
  pub percent:   Option<f64>,
  pub title:     String
}

#[tracing::instrument(skip(build), fields(tasks = build.tasks.len()))]
#[must_use]
pub fn aggregate_counts(
  build: &Build
) -> BuildTally {
  let mut tally = BuildTally::default();
  for entry in &build.tasks {
    match Bucket::for_status(
      &entry.task.status
    ) {
      | Bucket::Success => {
        tally.success += 1
      }
      | Bucket::Failed => {
        tally.failed += 1
      }
      | Bucket::Started => {
        tally.started += 1
      }
      | Bucket::Neither => {
        tally.neither += 1
      }
    }
  }
  debug!(?tally, "aggregated build");
  tally
}

impl BuildTally {
  #[must_use]
  pub fn total(&self) -> usize {
    self.success
      + self.failed
      + self.started
      + self.neither
  }

  #[must_use]
  pub fn count(
    &self,
    bucket: Bucket
  ) -> usize {
    match bucket {
      | Bucket::Success => self.success,
      | Bucket::Failed => self.failed,
      | Bucket::Started => self.started,
      | Bucket::Neither => self.neither
    }
  }

  /// Share of the build in `bucket`, in percent. `None` for an empty build.
  #[must_use]
  pub fn percent(
    &self,
    bucket: Bucket
  ) -> Option<f64> {
    let total = self.total();
    if total == 0 {
      return None;
    }
    Some(
      self.count(bucket) as f64
        / total as f64
        * 100.0
    )
  }

  #[must_use]
  pub fn summary(
    &self,
    bucket: Bucket
  ) -> String {
    summarize(
      self.count(bucket),
      bucket.phrase()
    )
  }

  #[must_use]
  pub fn segments(
    &self
  ) -> Vec<ProgressSegment> {
    Bucket::ALL
      .iter()
      .map(|&bucket| {
        ProgressSegment {
          bucket,
          count: self.count(bucket),
          css_class: bucket
            .css_class(),
          percent: self
            .percent(bucket),
          title: self.summary(bucket)
        }
      })
      .collect()
  }
}

/// `"1 task failed"`, `"3 tasks failed"`, `"0 tasks failed"`.
#[must_use]
pub fn summarize(
  count: usize,
  phrase: &str
) -> String {
  let noun = if count == 1 {
    "task"
  } else {
    "tasks"
  };
  format!("{count} {noun} {phrase}")
}

/// Stacked bootstrap progress bar, one tooltip-enabled segment per bucket.
#[must_use]
pub fn render_progress_bar(
  tally: &BuildTally
) -> String {
  let mut html = String::new();
  for segment in tally.segments() {
    let width =
      segment.percent.unwrap_or(0.0);
    html.push_str(&format!(
      "<div class=\"{}\" \
       role=\"progressbar\" \
       style=\"width: {width}%\" \
       data-toggle=\"tooltip\" \
       data-animation=\"\" \
       title=\"{}\"></div>",
      segment.css_class,
      escape_attr(&segment.title)
    ));
  }
  html
}

fn escape_attr(raw: &str) -> String {
  let mut out =
    String::with_capacity(raw.len());
  for ch in raw.chars() {
    match ch {
      | '&' => out.push_str("&amp;"),
      | '<' => out.push_str("&lt;"),
      | '>' => out.push_str("&gt;"),
      | '"' => out.push_str("&quot;"),
      | '\'' => out.push_str("&#39;"),
      | other => out.push(other)
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::{
    Bucket,
    BuildTally,
    aggregate_counts,
    render_progress_bar,
    summarize
  };
  use crate::task::{
    Build,
    TaskStatus
  };

  #[test]
  fn counts_each_bucket_once() {
    let build = Build::from_statuses([
      TaskStatus::Success,
      TaskStatus::Failed,
      TaskStatus::Started,
      TaskStatus::Cancelled
    ]);
    let tally = aggregate_counts(&build);

    assert_eq!(
      tally,
      BuildTally {
        success: 1,
        failed:  1,
        started: 1,
        neither: 1
      }
    );
    for bucket in Bucket::ALL {
      assert_eq!(
        tally.percent(bucket),
        Some(25.0)
      );
    }
  }

  #[test]
  fn unscheduled_and_unknown_fall_into_neither()
  {
    let build = Build::from_statuses([
      TaskStatus::Undispatched,
      TaskStatus::Dispatched,
      TaskStatus::Other(
        "weird".to_string()
      ),
      TaskStatus::Missing
    ]);
    let tally = aggregate_counts(&build);
    assert_eq!(tally.neither, 4);
    assert_eq!(tally.total(), 4);
  }

  #[test]
  fn empty_build_has_no_percentages() {
    let tally =
      aggregate_counts(&Build::default());
    assert_eq!(tally.total(), 0);
    assert_eq!(
      tally.percent(Bucket::Success),
      None
    );
    assert_eq!(
      tally.summary(Bucket::Failed),
      "0 tasks failed"
    );
  }

  #[test]
  fn summaries_pluralise() {
    assert_eq!(
      summarize(1, "succeeded"),
      "1 task succeeded"
    );
    assert_eq!(
      summarize(2, "in progress"),
      "2 tasks in progress"
    );
    assert_eq!(
      summarize(
        0,
        Bucket::Neither.phrase()
      ),
      "0 tasks not started or cancelled"
    );
  }

  #[test]
  fn renders_four_segments() {
    let tally = BuildTally {
      success: 3,
      failed:  1,
      started: 0,
      neither: 0
    };
    let html = render_progress_bar(&tally);

    assert_eq!(
      html.matches("role=\"progressbar\"").count(),
      4
    );
    assert!(html.contains(
      "class=\"progress-bar progress-bar-success\" role=\"progressbar\" style=\"width: 75%\""
    ));
    assert!(html.contains(
      "title=\"1 task failed\""
    ));
    assert!(html.contains(
      "style=\"width: 0%\" data-toggle=\"tooltip\" data-animation=\"\" title=\"0 tasks in progress\""
    ));
  }

  #[test]
  fn empty_build_renders_zero_width() {
    let html = render_progress_bar(
      &BuildTally::default()
    );
    assert_eq!(
      html.matches("width: 0%").count(),
      4
    );
  }
}
