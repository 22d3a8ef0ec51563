//! User-facing progress lines and the run's final exit status.

use crossterm::style::{StyledContent, Stylize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::{self, Write};
use std::time::Instant;

use crate::error::{ClonerError, EXIT_EXECUTION_ERROR, EXIT_SUCCESS};
use crate::sync::{PlannedAction, SyncOutcome, SyncSummary};

pub const PROCESS_NAME: &str = "gitlab-cloner";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Debug,
    Info,
    Warn,
    Success,
    Error,
}

/// An outcome together with the repository or group it belongs to
#[derive(Debug)]
pub struct RecordedOutcome {
    pub name: String,
    pub outcome: SyncOutcome,
}

/// Writes `[gitlab-cloner:<pid>] message` lines and collects outcomes
pub struct Reporter {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    color: bool,
    header: String,
    outcomes: Vec<RecordedOutcome>,
    started: Instant,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>, color: bool) -> Self {
        Self {
            out,
            err,
            color,
            header: format!("[{}:{}]", PROCESS_NAME, std::process::id()),
            outcomes: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Reporter on the process's stdout and stderr
    pub fn stdio(color: bool) -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()), color)
    }

    pub fn debug(&mut self, message: impl Display) {
        self.line(Level::Debug, message);
    }

    pub fn info(&mut self, message: impl Display) {
        self.line(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Display) {
        self.line(Level::Warn, message);
    }

    pub fn success(&mut self, message: impl Display) {
        self.line(Level::Success, message);
    }

    pub fn error(&mut self, message: impl Display) {
        self.line(Level::Error, message);
    }

    fn styled_header(&self, level: Level) -> StyledContent<&str> {
        let header = self.header.as_str();
        match level {
            Level::Debug => header.dark_grey(),
            Level::Info => header.blue(),
            Level::Warn => header.yellow(),
            Level::Success => header.green(),
            Level::Error => header.red(),
        }
    }

    fn line(&mut self, level: Level, message: impl Display) {
        let line = if self.color {
            format!("{} {}", self.styled_header(level), message)
        } else {
            format!("{} {}", self.header, message)
        };

        let sink = match level {
            Level::Error => &mut self.err,
            _ => &mut self.out,
        };
        writeln!(sink, "{}", line).ok();
    }

    /// Print the line for `outcome` and keep it for the summary
    pub fn record(&mut self, name: &str, outcome: SyncOutcome) {
        match &outcome {
            SyncOutcome::Cloned { path } => {
                self.success(format!("cloned: {} -> {}", name, path.display()))
            }
            SyncOutcome::Fetched { path } => {
                self.success(format!("fetched: {} ({})", name, path.display()))
            }
            SyncOutcome::Listed { path, action } => match action {
                PlannedAction::Clone => {
                    self.info(format!("would clone: {} -> {}", name, path.display()))
                }
                PlannedAction::Fetch => {
                    self.info(format!("would fetch: {} ({})", name, path.display()))
                }
                PlannedAction::Blocked => self.warn(format!(
                    "would fail: {} ({} exists and is not a git repository)",
                    name,
                    path.display()
                )),
            },
            SyncOutcome::Excluded { .. } => self.warn(format!("excluding: {}", name)),
            SyncOutcome::Failed { error, .. } => self.error(format!("error: {}: {}", name, error)),
        }

        self.outcomes.push(RecordedOutcome {
            name: name.to_string(),
            outcome,
        });
    }

    pub fn outcomes(&self) -> &[RecordedOutcome] {
        &self.outcomes
    }

    fn failures(&self) -> impl Iterator<Item = &ClonerError> {
        self.outcomes.iter().filter_map(|r| match &r.outcome {
            SyncOutcome::Failed { error, .. } => Some(error),
            _ => None,
        })
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary {
            duration: self.started.elapsed(),
            ..Default::default()
        };

        for recorded in &self.outcomes {
            match recorded.outcome {
                SyncOutcome::Cloned { .. } => summary.cloned += 1,
                SyncOutcome::Fetched { .. } => summary.fetched += 1,
                SyncOutcome::Listed { .. } => summary.listed += 1,
                SyncOutcome::Excluded { .. } => {
                    summary.excluded += 1;
                    continue;
                }
                SyncOutcome::Failed { .. } => summary.failed += 1,
            }
            summary.total_repositories += 1;
        }

        summary
    }

    /// Print the closing lines of a run
    pub fn finish(&mut self, dry_run: bool) {
        let summary = self.summary();
        self.debug(format!(
            "repositories: {}, cloned: {}, fetched: {}, excluded: {}, failed: {}, took {:.1}s",
            summary.total_repositories,
            summary.cloned,
            summary.fetched,
            summary.excluded,
            summary.failed,
            summary.duration.as_secs_f64()
        ));

        if summary.failed > 0 {
            self.error(format!(
                "{} of {} repositories failed",
                summary.failed, summary.total_repositories
            ));
        } else if dry_run {
            self.success(format!(
                "dry-run completed: {} repositories listed",
                summary.listed
            ));
        } else {
            self.success("mission accomplished");
        }
    }

    /// 0 with no failures, the shared class code when all failures agree, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        let codes: BTreeSet<i32> = self.failures().map(ClonerError::exit_code).collect();
        let mut iter = codes.into_iter();
        match (iter.next(), iter.next()) {
            (None, _) => EXIT_SUCCESS,
            (Some(code), None) => code,
            (Some(_), Some(_)) => EXIT_EXECUTION_ERROR,
        }
    }
}
