use std::{
    sync::{Arc, atomic::Ordering},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, info, warn};

use crate::{
    device::{DeviceOpener, open_and_start},
    supervisor::{Shared, Supervisor},
    threads::spawn_thread,
    types::{CaptureError, Frame, SupervisorState},
    watchdog::{DEFAULT_POLL_TIMEOUT, WatchdogConfig},
};

/// Bound on each forced `stop`/`close`/`open` call during escalation.
pub const DEFAULT_DEVICE_OP_TIMEOUT: Duration = Duration::from_secs(1);
/// Time `stop()` waits for the supervisor before detaching it.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
/// Consecutive reacquisitions without a frame before the device is declared dead.
pub const DEFAULT_MAX_ESCALATIONS: u32 = 5;

#[derive(Clone, Copy, Debug)]
pub struct FrameSourceConfig {
    /// Bounded wait used by the supervisor when polling the mailbox.
    pub poll_timeout: Duration,
    pub watchdog: WatchdogConfig,
    pub device_op_timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_escalations: u32,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            watchdog: WatchdogConfig::default(),
            device_op_timeout: DEFAULT_DEVICE_OP_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_escalations: DEFAULT_MAX_ESCALATIONS,
        }
    }
}

impl FrameSourceConfig {
    /// Wait applied by `stop()`: the configured grace, but never less than
    /// one mailbox poll plus a bounded device stop and close.
    pub fn shutdown_wait(&self) -> Duration {
        self.shutdown_grace.max(self.poll_timeout + self.device_op_timeout * 2)
    }
}

/// Supervised camera stream that only ever exposes its newest frame.
pub struct FrameSource {
    config: FrameSourceConfig,
    opener: Arc<dyn DeviceOpener>,
    shared: Arc<Shared>,
    supervisor: Option<thread::JoinHandle<()>>,
    done: Option<Receiver<()>>,
    stopped: bool,
}

impl FrameSource {
    pub fn new(opener: impl DeviceOpener + 'static, config: FrameSourceConfig) -> Self {
        Self {
            config,
            opener: Arc::new(opener),
            shared: Arc::new(Shared::new()),
            supervisor: None,
            done: None,
            stopped: false,
        }
    }

    /// Open the device and start the supervisor.
    ///
    /// Open failures are returned to the caller. Calling `start` again while
    /// running is a no-op; calling it after [`stop`](Self::stop) fails.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.stopped {
            return Err(CaptureError::Stopped);
        }
        if self.supervisor.is_some() {
            debug!("frame source already started");
            return Ok(());
        }

        let device = open_and_start(self.opener.as_ref())?;
        info!("starting stream for {}", device.describe());

        self.shared.running.store(true, Ordering::SeqCst);
        let (done_tx, done_rx) = bounded(1);
        let supervisor = Supervisor::new(
            device,
            self.opener.clone(),
            self.shared.clone(),
            self.config,
        );
        let handle = spawn_thread("frame-source-supervisor", move || supervisor.run(done_tx))
            .map_err(|err| {
                self.shared.running.store(false, Ordering::SeqCst);
                CaptureError::Other(err.into())
            })?;

        self.supervisor = Some(handle);
        self.done = Some(done_rx);
        Ok(())
    }

    /// Newest published frame, or `None` before the first one. Never blocks
    /// on the device.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.latest.load()
    }

    pub fn state(&self) -> SupervisorState {
        self.shared.state()
    }

    /// Surface an exhausted escalation budget as [`CaptureError::DeviceFatal`].
    pub fn check_health(&self) -> Result<(), CaptureError> {
        match self.shared.fatal() {
            Some(escalations) => Err(CaptureError::DeviceFatal { escalations }),
            None => Ok(()),
        }
    }

    pub fn frames_published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u64 {
        self.shared.restarts.load(Ordering::Relaxed)
    }

    pub fn escalations(&self) -> u32 {
        self.shared.escalations.load(Ordering::Relaxed)
    }

    /// Stop acquisition and release the device.
    ///
    /// Waits up to the shutdown grace for the supervisor; a supervisor stuck
    /// behind a hung device call is detached rather than joined.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.running.store(false, Ordering::SeqCst);

        let (Some(handle), Some(done)) = (self.supervisor.take(), self.done.take()) else {
            self.shared.set_state(SupervisorState::Stopped);
            return;
        };

        info!("stopping frame source");
        let wait = self.config.shutdown_wait();
        match done.recv_timeout(wait) {
            Ok(()) => {
                let _ = handle.join();
            }
            Err(_) => warn!("frame source supervisor did not finish within {wait:?}; detaching"),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grace_covers_a_bounded_close() {
        let config = FrameSourceConfig::default();
        assert!(
            config.shutdown_grace >= config.poll_timeout + config.device_op_timeout * 2,
            "{config:?}"
        );
        assert_eq!(config.shutdown_wait(), config.shutdown_grace);
    }

    #[test]
    fn short_grace_is_raised_to_the_close_bound() {
        let config = FrameSourceConfig {
            poll_timeout: Duration::from_millis(500),
            device_op_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(1),
            ..FrameSourceConfig::default()
        };
        assert_eq!(config.shutdown_wait(), Duration::from_millis(2500));
    }
}
