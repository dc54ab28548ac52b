use std::fs;
use std::io::{
  self,
  Read
};
use std::path::Path;

use anyhow::{
  Context,
  anyhow
};
use serde::de::DeserializeOwned;
use serde_json::{
  Value,
  json
};
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::classify::{
  Variant,
  badge_label,
  classify,
  classify_task,
  describe
};
use crate::cli::Command;
use crate::config::Config;
use crate::datetime::{
  Clock,
  FixedClock,
  SystemClock,
  elapsed_millis,
  parse_instant
};
use crate::paths::end_of_path;
use crate::progress::{
  aggregate_counts,
  render_progress_bar
};
use crate::render::{
  Renderer,
  TaskRow
};
use crate::task::{
  Build,
  ClassifyInput,
  Task,
  TaskStatus
};

#[instrument(skip(cfg, renderer, command))]
pub fn dispatch(
  cfg: &Config,
  renderer: &mut Renderer,
  command: Command
) -> anyhow::Result<()> {
  debug!(?command, "dispatching command");

  match command {
    | Command::Badge {
      status,
      kind
    } => {
      cmd_badge(
        cfg,
        renderer,
        &status,
        kind.as_deref()
      )
    }
    | Command::Classify {
      input
    } => {
      cmd_classify(
        renderer,
        input.as_deref()
      )
    }
    | Command::Describe {
      input
    } => {
      cmd_describe(
        cfg,
        renderer,
        input.as_deref()
      )
    }
    | Command::Progress {
      input,
      html
    } => {
      cmd_progress(
        renderer,
        input.as_deref(),
        html
      )
    }
    | Command::Elapsed {
      start,
      finish,
      now
    } => {
      cmd_elapsed(
        renderer,
        start.as_deref(),
        finish.as_deref(),
        now.as_deref()
      )
    }
    | Command::Basename {
      path
    } => {
      let base = end_of_path(&path);
      renderer.print_value(
        base,
        &json!({ "path": path, "base": base })
      )
    }
  }
}

fn badge_kind(
  cfg: &Config,
  kind: Option<&str>
) -> String {
  kind
    .map(str::to_string)
    .or_else(|| cfg.get("badge.type"))
    .unwrap_or_else(|| {
      "label".to_string()
    })
}

#[instrument(skip(cfg, renderer))]
fn cmd_badge(
  cfg: &Config,
  renderer: &mut Renderer,
  status: &str,
  kind: Option<&str>
) -> anyhow::Result<()> {
  info!("command badge");
  let kind = badge_kind(cfg, kind);
  let label = badge_label(
    &TaskStatus::parse(status),
    &kind
  );
  renderer.print_value(
    &label,
    &json!({ "status": status, "badge": label })
  )
}

#[instrument(skip(renderer))]
fn cmd_classify(
  renderer: &mut Renderer,
  input: Option<&Path>
) -> anyhow::Result<()> {
  info!("command classify");
  let items: Vec<ClassifyInput> =
    parse_json_items(&read_input(
      input
    )?)?;

  let classes: Vec<_> =
    items.iter().map(classify).collect();
  let plain = classes
    .iter()
    .map(|value| match value {
      | Value::String(
        s
      ) => s.clone(),
      | other => other.to_string()
    })
    .collect::<Vec<_>>()
    .join("\n");
  renderer.print_value(&plain, &classes)
}

#[instrument(skip(cfg, renderer))]
fn cmd_describe(
  cfg: &Config,
  renderer: &mut Renderer,
  input: Option<&Path>
) -> anyhow::Result<()> {
  info!("command describe");
  let kind = badge_kind(cfg, None);
  let items: Vec<Value> =
    parse_json_items(&read_input(
      input
    )?)?;

  let rows =
    describe_rows(items, &kind);
  renderer.print_task_rows(&rows)
}

/// One row per task record. Non-object entries are skipped so a single bad
/// entry does not hide the rest of the batch.
pub fn describe_rows(
  items: Vec<Value>,
  kind: &str
) -> Vec<TaskRow> {
  items
    .into_iter()
    .enumerate()
    .filter_map(|(idx, item)| {
      match item {
        | Value::Object(map) => {
          Some((
            idx,
            Task::from_record(map)
          ))
        }
        | other => {
          warn!(
            entry = idx + 1,
            value = %other,
            "skipping non-object task entry"
          );
          None
        }
      }
    })
    .map(|(idx, task)| TaskRow {
      id:      task
        .id
        .clone()
        .or_else(|| {
          task.display_name.clone()
        })
        .unwrap_or_else(|| {
          (idx + 1).to_string()
        }),
      status:  task.status.to_string(),
      class:   classify_task(&task),
      label:   describe(&task),
      badge:   badge_label(
        &task.status,
        kind
      ),
      variant: Variant::for_status(
        &task.status
      )
    })
    .collect()
}

#[instrument(skip(renderer))]
fn cmd_progress(
  renderer: &mut Renderer,
  input: Option<&Path>,
  html: bool
) -> anyhow::Result<()> {
  info!("command progress");
  let text = read_input(input)?;
  let build: Build =
    serde_json::from_str(text.trim())
      .context(
        "failed parsing build JSON"
      )?;
  let tally = aggregate_counts(&build);

  if html {
    let markup =
      render_progress_bar(&tally);
    return renderer.print_value(
      &markup,
      &json!({ "html": markup })
    );
  }

  renderer.print_tally(&tally)
}

#[instrument(skip(renderer))]
fn cmd_elapsed(
  renderer: &mut Renderer,
  start: Option<&str>,
  finish: Option<&str>,
  now: Option<&str>
) -> anyhow::Result<()> {
  info!("command elapsed");
  let clock: Box<dyn Clock> =
    match now.and_then(parse_instant) {
      | Some(fixed) => {
        Box::new(FixedClock(fixed))
      }
      | None => Box::new(SystemClock)
    };

  let millis = elapsed_millis(
    start.and_then(parse_instant),
    finish.and_then(parse_instant),
    Some(clock.now())
  );
  renderer.print_value(
    &millis.to_string(),
    &json!({ "elapsed_ms": millis })
  )
}

fn read_input(
  path: Option<&Path>
) -> anyhow::Result<String> {
  match path {
    | Some(path)
      if path != Path::new("-") =>
    {
      fs::read_to_string(path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })
    }
    | _ => {
      let mut text = String::new();
      io::stdin()
        .read_to_string(&mut text)
        .context(
          "failed reading stdin"
        )?;
      Ok(text)
    }
  }
}

/// Accepts a JSON array, a single JSON value, or one JSON value per line.
pub fn parse_json_items<T>(
  text: &str
) -> anyhow::Result<Vec<T>>
where
  T: DeserializeOwned
{
  let trimmed = text.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "empty input"
    ));
  }

  if trimmed.starts_with('[') {
    return serde_json::from_str(
      trimmed
    )
    .context(
      "failed parsing JSON array"
    );
  }

  if let Ok(item) =
    serde_json::from_str::<T>(trimmed)
  {
    return Ok(vec![item]);
  }

  let mut out = Vec::new();
  for (idx, line) in
    trimmed.lines().enumerate()
  {
    let token = line.trim();
    if token.is_empty() {
      continue;
    }
    let item: T =
      serde_json::from_str(token)
        .with_context(|| {
          format!(
            "failed parsing input \
             line {}",
            idx + 1
          )
        })?;
    out.push(item);
  }

  debug!(
    count = out.len(),
    "parsed JSON lines"
  );
  Ok(out)
}
