//! Stall detection for the acquisition worker.
//!
//! The watchdog tracks when a frame was last published and when the current
//! worker generation was spawned. It is owned by the supervisor thread, so
//! it needs no synchronisation of its own.

use std::time::{Duration, Instant};

/// Poll interval for the supervisor's bounded wait on the mailbox.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
/// Time without a frame before a running worker is considered stalled.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(1);
/// Stall threshold used until the first frame of a generation arrives.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(3);
/// Restarts closer together than this escalate to full reacquisition.
pub const DEFAULT_MIN_RESTART_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct WatchdogConfig {
    pub stall_timeout: Duration,
    pub startup_grace: Duration,
    pub min_restart_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            startup_grace: DEFAULT_STARTUP_GRACE,
            min_restart_interval: DEFAULT_MIN_RESTART_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RestartKind {
    /// Spawn a new worker against the existing device.
    Worker,
    /// Force the device down and reopen it before spawning.
    Reacquire,
}

pub(crate) struct CaptureWatchdog {
    config: WatchdogConfig,
    last_publish: Instant,
    first_frame_seen: bool,
    last_spawn: Option<Instant>,
}

impl CaptureWatchdog {
    pub(crate) fn new(config: WatchdogConfig, now: Instant) -> Self {
        Self {
            config,
            last_publish: now,
            first_frame_seen: false,
            last_spawn: None,
        }
    }

    /// Register a published frame.
    pub(crate) fn beat(&mut self, now: Instant) {
        self.last_publish = now;
        self.first_frame_seen = true;
    }

    pub(crate) fn first_frame_seen(&self) -> bool {
        self.first_frame_seen
    }

    /// Threshold currently in force: the stall timeout once a frame has
    /// arrived, the startup grace before that.
    pub(crate) fn threshold(&self) -> Duration {
        if self.first_frame_seen {
            self.config.stall_timeout
        } else {
            self.config.startup_grace
        }
    }

    pub(crate) fn is_stalled(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_publish) > self.threshold()
    }

    /// Decide how to bring up the next worker generation.
    pub(crate) fn restart_kind(&self, now: Instant) -> RestartKind {
        match self.last_spawn {
            Some(previous)
                if now.saturating_duration_since(previous) < self.config.min_restart_interval =>
            {
                RestartKind::Reacquire
            }
            _ => RestartKind::Worker,
        }
    }

    /// Record a new worker generation; the stall clock restarts with it.
    pub(crate) fn record_spawn(&mut self, now: Instant) {
        self.last_spawn = Some(now);
        self.last_publish = now;
        self.first_frame_seen = false;
    }
}
