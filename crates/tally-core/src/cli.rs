use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally",
    version,
    about = "Status badges, labels and progress summaries for CI tasks and builds",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "tallyrc", global = true)]
    pub tallyrc: Option<PathBuf>,

    /// Emit JSON regardless of the `output` setting.
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Badge CSS class for a status, e.g. `label-danger`.
    Badge {
        status: String,

        /// Class prefix; defaults to the `badge.type` setting.
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// Status class for each task record (or pre-classified value).
    Classify { input: Option<PathBuf> },

    /// Human-readable label for each task.
    Describe { input: Option<PathBuf> },

    /// Per-bucket counts for a build.
    Progress {
        input: Option<PathBuf>,

        /// Print the stacked progress-bar markup instead of a table.
        #[arg(long)]
        html: bool,
    },

    /// Milliseconds between start and finish (or now).
    Elapsed {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        finish: Option<String>,

        #[arg(long)]
        now: Option<String>,
    },

    /// Last component of a slash- or backslash-separated path.
    Basename { path: String },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, preprocess_args};

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["tally", "rc.color=off", "badge", "rc.badge.type:btn", "failed"]))
            .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["tally", "badge", "failed"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.badge.type".to_string(), "btn".to_string()),
            ]
        );
    }

    #[test]
    fn parses_subcommands_with_global_flags() {
        let cli = GlobalCli::parse_from(args(&["tally", "-vv", "progress", "build.json", "--html", "--json"]));
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.command {
            Command::Progress { input, html } => {
                assert_eq!(input.as_deref(), Some(std::path::Path::new("build.json")));
                assert!(html);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rc_flag_requires_key_value() {
        let result = GlobalCli::try_parse_from(args(&["tally", "--rc", "nope", "basename", "a/b"]));
        assert!(result.is_err());
    }
}
