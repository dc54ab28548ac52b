use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const RC_ENV_VAR: &str = "TALLYRC";

const DEFAULTS: [(&str, &str); 3] = [
  ("badge.type", "label"),
  ("color", "on"),
  ("output", "table")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// One meaningful line of a tallyrc.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting(&'a str, &'a str)
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading tallyrc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!("no tallyrc; using defaults")
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// Strict boolean lookup; unrecognised values are an error rather than
  /// silently false.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "1" | "yes" | "on" | "true" => {
        Ok(Some(true))
      }
      | "0" | "no" | "off" | "false" => {
        Ok(Some(false))
      }
      | _ => {
        Err(anyhow!(
          "invalid {key} setting: {raw}"
        ))
      }
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = home_relative(path);
    if self.loaded_files.contains(&path)
    {
      bail!(
        "include cycle at {}",
        path.display()
      );
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(raw_line)
        .with_context(|| {
          format!(
            "invalid config line {}:{}",
            path.display(),
            idx + 1
          )
        })?;

      match parsed {
        | None => {}
        | Some(RcLine::Setting(
          key,
          value
        )) => {
          trace!(key, value, "loaded config key");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | Some(RcLine::Include(
          target
        )) => {
          let include = path
            .parent()
            .unwrap_or(Path::new("."))
            .join(home_relative(
              Path::new(target)
            ));
          if include.exists() {
            self.load_file(&include)?;
          } else {
            warn!(include = %include.display(), "include file does not exist; skipping");
          }
        }
      }
    }

    Ok(())
  }
}

/// Blank and comment-only lines yield `None`.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();

  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      bail!("include path cannot be empty");
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!("expected key = value: {raw}")
    })?;
  Ok(Some(RcLine::Setting(
    key.trim(),
    value.trim()
  )))
}

fn rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(from_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (from_env != "/dev/null")
      .then(|| PathBuf::from(from_env));
  }

  dirs::home_dir()
    .map(|home| home.join(".tallyrc"))
    .filter(|candidate| {
      candidate.exists()
    })
}

/// Expands a leading `~/`. Joining an absolute result onto a base directory
/// keeps it absolute.
fn home_relative(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    parse_rc_line
  };

  #[test]
  fn defaults_are_present() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("badge.type").as_deref(),
      Some("label")
    );
    assert_eq!(
      cfg.get_bool("color").expect("bool"),
      Some(true)
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "rc.badge.type".to_string(),
      "btn".to_string()
    )]);
    assert_eq!(
      cfg.get("badge.type").as_deref(),
      Some("btn")
    );
  }

  #[test]
  fn invalid_bool_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.get_bool("color").is_err());
  }

  #[test]
  fn classifies_rc_lines() {
    assert_eq!(
      parse_rc_line("  # comment")
        .expect("comment"),
      None
    );
    assert_eq!(
      parse_rc_line("output = json # trailing")
        .expect("setting"),
      Some(RcLine::Setting(
        "output", "json"
      ))
    );
    assert_eq!(
      parse_rc_line("include  extra.rc ")
        .expect("include"),
      Some(RcLine::Include("extra.rc"))
    );
    assert!(parse_rc_line("no separator").is_err());
  }

  #[test]
  fn include_cycles_are_rejected() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("loop.rc");
    fs::write(&rc, "include loop.rc\n")
      .expect("write rc");

    let err = Config::load(Some(&rc))
      .expect_err("cycle");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );
  }
}
