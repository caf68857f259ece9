//! The control loop: poll, decide, dispatch, check for quit.
//!
//! The loop owns the detection source and the command channel for its whole
//! lifetime. However it ends (quit, tick limit, source end, channel or source
//! failure, or a panic unwinding through it), the channel is closed first,
//! which sends the final STOP, and the source is released after.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::channel::{ChannelStats, Dispatch};
use crate::decision::{decide, GeometryConfig};
use crate::snapshot::{DetectionSource, Snapshot};

/// Cooperative quit flag, polled once per tick.
#[derive(Clone, Debug, Default)]
pub struct QuitSignal {
    raised: Arc<AtomicBool>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Raise on Ctrl-C.
    pub fn install_ctrlc(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, stopping");
            signal.raise();
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))
    }

    /// Raise when a `q` line arrives on stdin.
    pub fn watch_stdin(&self) -> Result<()> {
        let signal = self.clone();
        std::thread::Builder::new()
            .name("quit-watcher".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if is_quit_line(&line) {
                        log::info!("quit requested");
                        signal.raise();
                        break;
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn quit watcher: {}", e))?;
        Ok(())
    }
}

fn is_quit_line(line: &str) -> bool {
    matches!(line.trim(), "q" | "Q" | "quit")
}

/// Why the loop stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExitReason {
    /// Never ran.
    #[default]
    NotStarted,
    Quit,
    TickLimit,
    SourceEnded,
    ChannelFailure(String),
    SourceFailure(String),
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ChannelFailure(_) | Self::SourceFailure(_))
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Quit => write!(f, "quit requested"),
            Self::TickLimit => write!(f, "tick limit reached"),
            Self::SourceEnded => write!(f, "source ended"),
            Self::ChannelFailure(e) => write!(f, "channel failure: {}", e),
            Self::SourceFailure(e) => write!(f, "source failure: {}", e),
        }
    }
}

/// Summary of a finished session.
#[derive(Clone, Debug, Default)]
pub struct LoopReport {
    pub ticks: u64,
    /// Ticks without a frame.
    pub skipped_ticks: u64,
    pub exit: ExitReason,
    pub channel: ChannelStats,
}

#[derive(Clone, Copy, Debug)]
pub struct LoopSettings {
    /// Minimum tick period; `None` runs as fast as the source allows.
    pub tick_interval: Option<Duration>,
    pub max_ticks: Option<u64>,
    pub health_interval: Duration,
}

impl LoopSettings {
    pub fn paced(target_fps: u32) -> Self {
        Self {
            tick_interval: (target_fps > 0)
                .then(|| Duration::from_secs_f64(1.0 / f64::from(target_fps))),
            ..Self::default()
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval: None,
            max_ticks: None,
            health_interval: Duration::from_secs(5),
        }
    }
}

pub struct ControlLoop<S: DetectionSource, D: Dispatch> {
    source: S,
    dispatch: D,
    geometry: GeometryConfig,
    quit: QuitSignal,
    settings: LoopSettings,
    report: LoopReport,
    shut_down: bool,
}

impl<S: DetectionSource, D: Dispatch> ControlLoop<S, D> {
    pub fn new(source: S, dispatch: D, geometry: GeometryConfig, quit: QuitSignal) -> Self {
        Self {
            source,
            dispatch,
            geometry,
            quit,
            settings: LoopSettings::default(),
            report: LoopReport::default(),
            shut_down: false,
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run until a termination condition, then close and release everything.
    pub fn run(mut self) -> LoopReport {
        log::info!(
            "control loop running: source={} frame_width={} tolerance={}",
            self.source.describe(),
            self.geometry.frame_width(),
            self.geometry.center_tolerance()
        );
        self.report.exit = self.run_ticks();
        self.shutdown();
        // A decoupled sender may fail after the loop has already stopped.
        if !self.report.exit.is_failure() {
            if let Some(failure) = self.dispatch.failure() {
                self.report.exit = ExitReason::ChannelFailure(failure);
            }
        }
        match &self.report.exit {
            reason if reason.is_failure() => log::error!("control loop stopped: {}", reason),
            reason => log::info!("control loop stopped: {}", reason),
        }
        self.report.clone()
    }

    fn run_ticks(&mut self) -> ExitReason {
        if self.quit.is_raised() {
            return ExitReason::Quit;
        }
        let mut last_health_log = Instant::now();
        loop {
            if self
                .settings
                .max_ticks
                .is_some_and(|max| self.report.ticks >= max)
            {
                return ExitReason::TickLimit;
            }

            let tick_started = Instant::now();
            self.report.ticks += 1;

            match self.source.poll() {
                Ok(Snapshot::Ready(detection)) => {
                    let command = decide(Some(&detection), &self.geometry);
                    log::debug!(
                        "tick {}: subject={:?} gestures={:?} -> {}",
                        self.report.ticks,
                        detection.subject,
                        detection.gestures,
                        command
                    );
                    if let Err(e) = self.dispatch.dispatch(command) {
                        return ExitReason::ChannelFailure(format!("{e:#}"));
                    }
                }
                Ok(Snapshot::Pending) => self.report.skipped_ticks += 1,
                Ok(Snapshot::Ended) => return ExitReason::SourceEnded,
                Err(e) => return ExitReason::SourceFailure(format!("{e:#}")),
            }

            if let Some(failure) = self.dispatch.failure() {
                return ExitReason::ChannelFailure(failure);
            }

            if self.quit.is_raised() {
                return ExitReason::Quit;
            }

            if last_health_log.elapsed() >= self.settings.health_interval {
                let stats = self.dispatch.stats();
                log::info!(
                    "health source={} healthy={} ticks={} skipped={} sent={} last={}",
                    self.source.describe(),
                    self.source.is_healthy(),
                    self.report.ticks,
                    self.report.skipped_ticks,
                    stats.commands.total(),
                    stats
                        .last_command
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                last_health_log = Instant::now();
            }

            if let Some(interval) = self.settings.tick_interval {
                if let Some(remaining) = interval.checked_sub(tick_started.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }
    }

    /// Close the channel (final STOP) and release the source. Idempotent.
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.dispatch.close();
        self.source.release();
        self.report.channel = self.dispatch.stats();
        log::info!(
            "shutdown complete: ticks={} skipped={} sent={} final_stop={}",
            self.report.ticks,
            self.report.skipped_ticks,
            self.report.channel.commands.total(),
            self.report.channel.stopped_on_close
        );
    }
}

impl<S: DetectionSource, D: Dispatch> Drop for ControlLoop<S, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
