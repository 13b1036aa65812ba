//! Watch command: an interactive tracking session.
//!
//! Every named project gets a live tracker sharing one registry, so starting
//! one can pause the others. Input lines stand in for editor events:
//!
//! | line              | effect                                        |
//! |-------------------|-----------------------------------------------|
//! | `activity [p]`    | user activity (resumes an idle tracker)       |
//! | `edit [p]`        | editor content changed (auto start)           |
//! | `start [p]`       | start running                                 |
//! | `stop [p]`        | stop                                          |
//! | `toggle [p]`      | toggle running                                |
//! | `add <delta> [p]` | adjust counted time                           |
//! | `reset [p]`       | zero counted time                             |
//! | `count-in [p]`    | count in the most recent reported idle gap    |
//! | `save [p]`        | fold running time and persist                 |
//! | `status`          | print every project                           |
//! | `quit`            | stop everything, persist and exit             |
//!
//! Without a project name a command applies to the first project.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use anyhow::{Context, Result};

use wt_core::{
    ActivityHub, ActivityReporter, Adjustment, Clock, CountInAck, IdleGap, IdleNotifier, Registry,
    Status, StatusDisplay, SystemClock, ThreadTicker, Ticker, Tracker, millis_to_string,
};
use wt_db::Database;

use super::util;
use crate::Config;

/// Destination shared by the session and the tracker callbacks.
pub type SharedOutput = Arc<Mutex<dyn Write + Send>>;

fn emit(output: &SharedOutput, line: fmt::Arguments<'_>) {
    let mut out = output.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
        tracing::warn!(error = %e, "failed to write watch output");
    }
}

fn status_line(tracker: &Tracker) -> String {
    format!(
        "{}: {} {}",
        tracker.name(),
        tracker.status(),
        millis_to_string(tracker.elapsed_seconds().saturating_mul(1000))
    )
}

/// Announces idle gaps and keeps their count-in actions until asked.
struct PromptNotifier {
    name: String,
    output: SharedOutput,
    pending: Mutex<Vec<CountInAck>>,
}

impl PromptNotifier {
    fn new(name: &str, output: SharedOutput) -> Self {
        Self {
            name: name.to_string(),
            output,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Most recent gap that has not been counted in yet.
    fn take_latest(&self) -> Option<CountInAck> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|ack| !ack.is_spent());
        pending.pop()
    }
}

impl IdleNotifier for PromptNotifier {
    fn idle_gap(&self, gap: IdleGap) {
        emit(
            &self.output,
            format_args!(
                "{}: {}. Type `count-in {}` to count it.",
                self.name,
                gap.message(),
                self.name
            ),
        );
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(gap.into_ack());
    }
}

/// Prints a project's line whenever its status changes.
struct TerminalDisplay {
    tracker: OnceLock<Weak<Tracker>>,
    last_status: Mutex<Option<Status>>,
    output: SharedOutput,
}

impl TerminalDisplay {
    fn new(output: SharedOutput) -> Self {
        Self {
            tracker: OnceLock::new(),
            last_status: Mutex::new(None),
            output,
        }
    }
}

impl StatusDisplay for TerminalDisplay {
    fn refresh(&self, relayout: bool) {
        let Some(tracker) = self.tracker.get().and_then(Weak::upgrade) else {
            return;
        };
        let status = tracker.status();
        {
            let mut last = self
                .last_status
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !relayout && *last == Some(status) {
                return;
            }
            *last = Some(status);
        }
        emit(&self.output, format_args!("{}", status_line(&tracker)));
    }
}

struct Project {
    tracker: Arc<Tracker>,
    hub: Arc<ActivityHub>,
    prompts: Arc<PromptNotifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Activity,
    Edit,
    Start,
    Stop,
    Toggle,
    Adjust(Adjustment),
    CountIn,
    Save,
    Status,
    Quit,
}

/// Splits an input line into an action and an optional project name.
fn parse_line(line: &str) -> Result<Option<(Action, Option<&str>)>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let action = match command {
        "activity" => Action::Activity,
        "edit" => Action::Edit,
        "start" => Action::Start,
        "stop" => Action::Stop,
        "toggle" => Action::Toggle,
        "add" => {
            let delta = words.next().context("usage: add <delta> [project]")?;
            Action::Adjust(Adjustment::By(util::parse_delta(delta)?))
        }
        "reset" => Action::Adjust(Adjustment::Reset),
        "count-in" => Action::CountIn,
        "save" => Action::Save,
        "status" => Action::Status,
        "quit" | "exit" => Action::Quit,
        other => anyhow::bail!("Unknown command: {other}"),
    };

    let project = words.next();
    if let Some(extra) = words.next() {
        anyhow::bail!("Unexpected argument: {extra}");
    }
    Ok(Some((action, project)))
}

/// Live trackers for a set of projects.
pub struct Session<'a> {
    db: &'a Database,
    registry: Arc<Registry>,
    projects: Vec<Project>,
    output: SharedOutput,
}

impl<'a> Session<'a> {
    /// Opens a tracker per project from its stored state (or the saved defaults).
    pub fn open<C, T>(
        db: &'a Database,
        names: &[String],
        stop_when_idle_rather_than_pausing: bool,
        clock: &C,
        ticker: &T,
        output: SharedOutput,
    ) -> Result<Self>
    where
        C: Clock + Clone + 'static,
        T: Ticker + Clone + 'static,
    {
        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
            anyhow::bail!("Project listed twice: {duplicate}");
        }

        let registry = Arc::new(Registry::new());
        let mut projects = Vec::with_capacity(names.len());

        for name in names {
            let state = util::stored_state(db, name)?;

            let hub = Arc::new(ActivityHub::new());
            let prompts = Arc::new(PromptNotifier::new(name, Arc::clone(&output)));
            let display = Arc::new(TerminalDisplay::new(Arc::clone(&output)));

            let tracker = Tracker::builder(name.as_str(), Arc::clone(&registry))
                .clock(clock.clone())
                .ticker(ticker.clone())
                .notifier(Arc::clone(&prompts) as Arc<dyn IdleNotifier>)
                .display(Arc::clone(&display) as Arc<dyn StatusDisplay>)
                .activity(Arc::clone(&hub) as Arc<dyn ActivityReporter>)
                .stop_when_idle_rather_than_pausing(stop_when_idle_rather_than_pausing)
                .state(state)
                .open();

            if display.tracker.set(Arc::downgrade(&tracker)).is_err() {
                tracing::warn!(project = %name, "display already bound to a tracker");
            }
            display.refresh(true);

            projects.push(Project {
                tracker,
                hub,
                prompts,
            });
        }

        tracing::info!(projects = projects.len(), "watch session opened");
        Ok(Self {
            db,
            registry,
            projects,
            output,
        })
    }

    fn project(&self, name: Option<&str>) -> Result<&Project> {
        match name {
            None => self.projects.first().context("no projects are being watched"),
            Some(name) => self
                .projects
                .iter()
                .find(|project| project.tracker.name() == name)
                .with_context(|| format!("Unknown project: {name}")),
        }
    }

    fn say(&self, line: fmt::Arguments<'_>) {
        emit(&self.output, line);
    }

    /// Handles one input line. Returns `false` once the session should end.
    pub fn handle_line(&self, line: &str) -> Result<bool> {
        let Some((action, name)) = parse_line(line)? else {
            return Ok(true);
        };
        if action == Action::Status {
            for project in &self.projects {
                self.say(format_args!("{}", status_line(&project.tracker)));
            }
            return Ok(true);
        }
        if action == Action::Quit {
            return Ok(false);
        }

        let project = self.project(name)?;
        let tracker = &project.tracker;
        match action {
            Action::Activity => tracker.notify_activity(),
            Action::Edit => {
                if project.hub.editor_content_changed() == 0 {
                    self.say(format_args!("{}: auto start is off", tracker.name()));
                }
            }
            Action::Start => tracker.set_status(Status::Running),
            Action::Stop => tracker.set_status(Status::Stopped),
            Action::Toggle => tracker.toggle_running(),
            Action::Adjust(adjustment) => {
                tracker.adjust_total(adjustment);
                self.say(format_args!("{}", status_line(tracker)));
            }
            Action::CountIn => match project.prompts.take_latest() {
                Some(ack) if ack.count_in() => {
                    self.say(format_args!("{}", status_line(tracker)));
                }
                _ => self.say(format_args!("{}: nothing to count in", tracker.name())),
            },
            Action::Save => {
                tracker.save_time();
                util::save(self.db, tracker)?;
                self.say(format_args!("{}: saved", tracker.name()));
            }
            Action::Status | Action::Quit => {}
        }
        Ok(true)
    }

    /// Reads commands until `quit` or end of input, then closes the session.
    pub fn run<R: BufRead>(self, input: R) -> Result<()> {
        for line in input.lines() {
            let line = line.context("failed to read input")?;
            match self.handle_line(&line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => self.say(format_args!("error: {e:#}")),
            }
        }
        self.finish()
    }

    /// Stops every tracker and persists its state.
    ///
    /// Every project is closed and a save is attempted for each, even if an
    /// earlier save fails. The first failure is returned.
    pub fn finish(self) -> Result<()> {
        for project in &self.projects {
            project.tracker.close();
        }

        let mut first_error = None;
        for project in &self.projects {
            if let Err(e) = util::save(self.db, &project.tracker) {
                tracing::error!(
                    project = project.tracker.name(),
                    error = %e,
                    "failed to save on exit"
                );
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(
            projects = self.projects.len(),
            live = self.registry.len(),
            "watch session closed"
        );
        first_error.map_or(Ok(()), Err)
    }
}

/// Runs a session on stdin and stdout with the real clock.
pub fn run(db: &Database, projects: &[String], config: &Config) -> Result<()> {
    let output: SharedOutput = Arc::new(Mutex::new(io::stdout()));
    let session = Session::open(
        db,
        projects,
        config.stop_when_idle_rather_than_pausing,
        &SystemClock,
        &ThreadTicker,
        output,
    )?;
    session.run(io::stdin().lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    use wt_core::{ManualClock, ManualTicker, TrackerState};

    use insta::assert_snapshot;

    struct Harness {
        db: Database,
        clock: ManualClock,
        ticker: ManualTicker,
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                db: Database::open_in_memory().unwrap(),
                clock: ManualClock::new(0),
                ticker: ManualTicker::new(),
                buffer: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn open(&self, names: &[&str]) -> Session<'_> {
            let names: Vec<String> = names.iter().map(ToString::to_string).collect();
            let output: SharedOutput = self.buffer.clone();
            Session::open(&self.db, &names, false, &self.clock, &self.ticker, output).unwrap()
        }

        fn tick_for(&self, seconds: i64) {
            for _ in 0..seconds {
                self.clock.advance(1000);
                self.ticker.fire();
            }
        }

        fn output(&self) -> String {
            String::from_utf8(self.buffer.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn idle_gap_is_reported_and_counted_in_once() {
        let harness = Harness::new();
        harness
            .db
            .save_state(
                "alpha",
                &TrackerState {
                    idle_threshold_ms: 5_000,
                    ..TrackerState::default()
                },
            )
            .unwrap();
        let session = harness.open(&["alpha"]);

        session.handle_line("start").unwrap();
        harness.tick_for(5);
        harness.clock.set(65_000);
        session.handle_line("activity").unwrap();
        session.handle_line("count-in").unwrap();
        session.handle_line("count-in").unwrap();
        session.finish().unwrap();

        assert_snapshot!(harness.output(), @r"
        alpha: stopped 0sec
        alpha: running 0sec
        alpha: idle 5sec
        alpha: Gone for 1m 0s. Type `count-in alpha` to count it.
        alpha: running 5sec
        alpha: running 1m 5s
        alpha: nothing to count in
        alpha: stopped 1m 5s
        ");
        assert_eq!(
            harness.db.load_state("alpha").unwrap().unwrap().total_time_seconds,
            65
        );
    }

    #[test]
    fn starting_one_project_pauses_the_other() {
        let harness = Harness::new();
        let session = harness.open(&["alpha", "beta"]);

        session.handle_line("start alpha").unwrap();
        harness.tick_for(3);
        session.handle_line("start beta").unwrap();

        let alpha = &session.project(Some("alpha")).unwrap().tracker;
        let beta = &session.project(Some("beta")).unwrap().tracker;
        assert_eq!(alpha.status(), Status::Idle);
        assert_eq!(beta.status(), Status::Running);
        assert_eq!(alpha.elapsed_seconds(), 3);
    }

    #[test]
    fn edit_starts_only_with_auto_start() {
        let harness = Harness::new();
        harness
            .db
            .save_state(
                "alpha",
                &TrackerState {
                    auto_start: true,
                    ..TrackerState::default()
                },
            )
            .unwrap();
        let session = harness.open(&["alpha", "beta"]);

        session.handle_line("edit beta").unwrap();
        session.handle_line("edit").unwrap();

        assert_eq!(
            session.project(Some("alpha")).unwrap().tracker.status(),
            Status::Running
        );
        assert_eq!(
            session.project(Some("beta")).unwrap().tracker.status(),
            Status::Stopped
        );
        assert!(harness.output().contains("beta: auto start is off\n"));
    }

    #[test]
    fn save_persists_running_time() {
        let harness = Harness::new();
        let session = harness.open(&["alpha"]);

        session.handle_line("start").unwrap();
        harness.tick_for(10);
        session.handle_line("add +1m").unwrap();
        session.handle_line("save").unwrap();

        let state = harness.db.load_state("alpha").unwrap().unwrap();
        assert_eq!(state.total_time_seconds, 70);
        assert_eq!(
            session.project(None).unwrap().tracker.status(),
            Status::Running
        );
    }

    #[test]
    fn run_stops_at_quit_and_reports_bad_lines() {
        let harness = Harness::new();
        let session = harness.open(&["alpha"]);

        let input = "start\nfly away\nstop gamma\nquit\nstart\n";
        session.run(input.as_bytes()).unwrap();

        let output = harness.output();
        assert!(output.contains("error: Unknown command: fly\n"));
        assert!(output.contains("error: Unknown project: gamma\n"));
        assert!(output.ends_with("alpha: stopped 0sec\n"));
        assert_eq!(harness.ticker.live_count(), 0);
    }

    #[test]
    fn new_projects_start_from_saved_defaults() {
        let harness = Harness::new();
        harness
            .db
            .save_defaults(&wt_core::DefaultSettings {
                idle_threshold_ms: 60_000,
                auto_count_idle_seconds: 10,
                pause_other_tracker_instances: false,
                auto_start: true,
            })
            .unwrap();
        let session = harness.open(&["fresh"]);

        let tracker = &session.project(None).unwrap().tracker;
        assert_eq!(tracker.idle_threshold_ms(), 60_000);
        assert_eq!(tracker.auto_count_idle_seconds(), 10);
        assert!(tracker.auto_start());
    }

    #[test]
    fn failed_save_still_closes_and_saves_the_rest() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("wt.db");
        let db = Database::open(&path).unwrap();
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER refuse_alpha BEFORE INSERT ON tracker_states
                 WHEN NEW.project = 'alpha'
                 BEGIN SELECT RAISE(ABORT, 'alpha is read-only'); END;",
            )
            .unwrap();

        let clock = ManualClock::new(0);
        let ticker = ManualTicker::new();
        let output: SharedOutput = Arc::new(Mutex::new(Vec::new()));
        let names = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let session = Session::open(&db, &names, false, &clock, &ticker, output).unwrap();

        session.handle_line("start beta").unwrap();
        for _ in 0..5 {
            clock.advance(1000);
            ticker.fire();
        }
        let trackers: Vec<Arc<Tracker>> = session
            .projects
            .iter()
            .map(|project| Arc::clone(&project.tracker))
            .collect();

        assert!(session.finish().is_err());

        assert!(trackers.iter().all(|tracker| tracker.status() == Status::Stopped));
        assert_eq!(ticker.live_count(), 0);
        assert!(db.load_state("alpha").unwrap().is_none());
        assert_eq!(db.load_state("beta").unwrap().unwrap().total_time_seconds, 5);
        assert!(db.load_state("gamma").unwrap().is_some());
    }

    #[test]
    fn duplicate_projects_are_rejected() {
        let harness = Harness::new();
        let names = vec!["alpha".to_string(), "alpha".to_string()];
        let output: SharedOutput = harness.buffer.clone();
        let result = Session::open(
            &harness.db,
            &names,
            false,
            &harness.clock,
            &harness.ticker,
            output,
        );
        assert!(result.is_err());
    }

    #[test]
    fn parses_commands_with_optional_project() {
        assert_eq!(
            parse_line("add -5m beta").unwrap(),
            Some((Action::Adjust(Adjustment::By(-300_000)), Some("beta")))
        );
        assert_eq!(parse_line("  ").unwrap(), None);
        assert!(parse_line("start a b").is_err());
        assert!(parse_line("add").is_err());
    }
}
