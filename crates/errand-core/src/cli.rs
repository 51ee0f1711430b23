use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::config::Config;
use crate::task::TaskId;

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
    name = "errand",
    version,
    about = "errand: personal task tracker with due-date reminders",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "errandrc")]
    pub errandrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
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
                .map(|(k, v)| (k.to_string(), v.to_string()));

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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Terms before the command word: task ids and list filters.
    pub filter_terms: Vec<String>,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        let default_command = cfg
            .get("default.command")
            .unwrap_or_else(|| "list".to_string());

        if tokens.is_empty() {
            debug!(command = %default_command, "no explicit command, using default");
            return Ok(Self {
                filter_terms: vec![],
                command: default_command,
                command_args: vec![],
            });
        }

        if tokens.len() == 1 && tokens[0].parse::<TaskId>().is_ok() {
            debug!(token = %tokens[0], "single numeric token interpreted as task info query");
            return Ok(Self {
                filter_terms: vec![tokens[0].clone()],
                command: "info".to_string(),
                command_args: vec![],
            });
        }

        match split_filter_command(&tokens) {
            Some((filter_terms, command, command_args)) => Ok(Self {
                filter_terms,
                command,
                command_args,
            }),
            None => {
                debug!(
                    command = %default_command,
                    "no command detected, treating all terms as filter"
                );
                Ok(Self {
                    filter_terms: tokens,
                    command: default_command,
                    command_args: vec![],
                })
            }
        }
    }

    /// Leading numeric terms, for commands that act on specific tasks.
    pub fn ids(&self) -> anyhow::Result<Vec<TaskId>> {
        self.filter_terms
            .iter()
            .flat_map(|term| term.split(','))
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<TaskId>()
                    .map_err(|_| anyhow!("expected a task id, got: {part}"))
            })
            .collect()
    }
}

fn split_filter_command(tokens: &[String]) -> Option<(Vec<String>, String, Vec<String>)> {
    let known = known_command_names();

    for (i, token) in tokens.iter().enumerate() {
        if let Some(full) = expand_command_abbrev(token, &known) {
            debug!(
                token = %token,
                expanded = %full,
                split_index = i,
                "resolved command token"
            );
            return Some((
                tokens[..i].to_vec(),
                full.to_string(),
                tokens[i + 1..].to_vec(),
            ));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "errand",
            "rc.backend=remote",
            "rc.color:off",
            "list",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["errand", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("backend".to_string(), "remote".to_string()),
                ("color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn ids_precede_an_abbreviated_command() {
        let cfg = Config::with_defaults();
        let inv = Invocation::parse(&cfg, args(&["3,5", "7", "del"])).expect("parse");
        assert_eq!(inv.command, "delete");
        assert_eq!(inv.ids().expect("ids"), vec![3, 5, 7]);

        let inv = Invocation::parse(&cfg, args(&["4"])).expect("parse");
        assert_eq!(inv.command, "info");
    }

    #[test]
    fn bare_terms_fall_back_to_default_command() {
        let cfg = Config::with_defaults();
        let inv = Invocation::parse(&cfg, args(&["pri:high", "+OVERDUE"])).expect("parse");
        assert_eq!(inv.command, "list");
        assert_eq!(inv.filter_terms, vec!["pri:high", "+OVERDUE"]);

        let inv = Invocation::parse(&cfg, args(&["add", "Pay", "rent", "due:tomorrow"]))
            .expect("parse");
        assert!(inv.filter_terms.is_empty());
        assert_eq!(inv.command_args, vec!["Pay", "rent", "due:tomorrow"]);
    }
}
