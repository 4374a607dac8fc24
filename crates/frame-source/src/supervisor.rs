//! Supervisor thread: owns the device handle, spawns generation-tagged
//! capture workers, and restarts or reacquires them when the watchdog fires.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
    },
    thread,
    time::Instant,
};

use chrono::Utc;
use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::{
    device::{CameraDevice, DeviceOpener, open_and_start},
    mailbox::{Handoff, HandoffPublisher, LatestFrame},
    source::FrameSourceConfig,
    threads::{run_with_deadline, spawn_thread},
    types::{CaptureError, Frame, SupervisorState},
    watchdog::{CaptureWatchdog, RestartKind},
};

/// State shared between the consumer, the supervisor and the workers.
pub(crate) struct Shared {
    pub(crate) running: AtomicBool,
    pub(crate) generation: AtomicU64,
    pub(crate) sequence: AtomicU64,
    pub(crate) published: AtomicU64,
    pub(crate) restarts: AtomicU64,
    pub(crate) escalations: AtomicU32,
    pub(crate) state: AtomicU8,
    pub(crate) latest: LatestFrame,
    fatal: Mutex<Option<u32>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            published: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            escalations: AtomicU32::new(0),
            state: AtomicU8::new(SupervisorState::Idle.to_u8()),
            latest: LatestFrame::default(),
            fatal: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: SupervisorState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    pub(crate) fn fatal(&self) -> Option<u32> {
        match self.fatal.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        }
    }

    fn mark_fatal(&self, escalations: u32) {
        if let Ok(mut guard) = self.fatal.lock() {
            *guard = Some(escalations);
        }
    }
}

pub(crate) struct Supervisor {
    device: Arc<dyn CameraDevice>,
    device_lost: bool,
    opener: Arc<dyn DeviceOpener>,
    shared: Arc<Shared>,
    config: FrameSourceConfig,
    handoff: Handoff,
    watchdog: CaptureWatchdog,
    worker: Option<thread::JoinHandle<()>>,
    worker_id: u64,
    escalations: u32,
}

impl Supervisor {
    pub(crate) fn new(
        device: Arc<dyn CameraDevice>,
        opener: Arc<dyn DeviceOpener>,
        shared: Arc<Shared>,
        config: FrameSourceConfig,
    ) -> Self {
        Self {
            device,
            device_lost: false,
            opener,
            shared,
            watchdog: CaptureWatchdog::new(config.watchdog, Instant::now()),
            config,
            handoff: Handoff::new(),
            worker: None,
            worker_id: 0,
            escalations: 0,
        }
    }

    /// Drive the state machine until the running flag clears or the
    /// escalation budget is exhausted, then release the device.
    pub(crate) fn run(mut self, done: Sender<()>) {
        let span = tracing::info_span!("frame_source.supervisor", device = %self.device.describe());
        let _guard = span.enter();

        let mut state = SupervisorState::Starting;
        self.shared.set_state(state);

        while self.shared.running.load(Ordering::SeqCst) {
            state = match state {
                SupervisorState::Starting | SupervisorState::Restarting => self.bring_up(state),
                SupervisorState::Running => self.poll(),
                SupervisorState::Stalled => self.retire_worker(),
                _ => break,
            };
            self.shared.set_state(state);
            if state == SupervisorState::Failed {
                break;
            }
        }

        if state != SupervisorState::Failed {
            self.shared.set_state(SupervisorState::Closing);
        }
        // Retire whatever worker is left so it exits after its current call.
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if !self.device_lost {
            self.force_close();
        }
        if state != SupervisorState::Failed {
            self.shared.set_state(SupervisorState::Stopped);
        }
        info!("frame source supervisor exited ({})", self.shared.state().label());
        let _ = done.send(());
    }

    fn bring_up(&mut self, from: SupervisorState) -> SupervisorState {
        let now = Instant::now();
        let needs_reacquire = self.device_lost
            || (from == SupervisorState::Restarting
                && self.watchdog.restart_kind(now) == RestartKind::Reacquire);

        if needs_reacquire {
            match self.reacquire() {
                Ok(()) => {}
                Err(CaptureError::DeviceFatal { escalations }) => {
                    error!(
                        "camera could not be recovered after {escalations} forced reacquisitions"
                    );
                    self.shared.mark_fatal(escalations);
                    return SupervisorState::Failed;
                }
                Err(err) => {
                    warn!("device reacquisition failed: {err}");
                    thread::sleep(self.config.poll_timeout);
                    return SupervisorState::Restarting;
                }
            }
        }

        match self.spawn_worker() {
            Ok(()) => SupervisorState::Running,
            Err(err) => {
                error!("failed to spawn capture worker: {err}");
                self.device_lost = true;
                SupervisorState::Restarting
            }
        }
    }

    fn poll(&mut self) -> SupervisorState {
        match self.handoff.recv_timeout(self.config.poll_timeout) {
            Ok(frame) => self.publish(frame),
            Err(RecvTimeoutError::Timeout) => {
                debug!("buffer capture timed out; skipping frame");
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("capture hand-off disconnected");
                return SupervisorState::Stalled;
            }
        }

        if self.worker.as_ref().is_some_and(|handle| handle.is_finished()) {
            warn!("capture worker #{} exited; restarting", self.worker_id);
            return SupervisorState::Stalled;
        }

        let now = Instant::now();
        if self.watchdog.is_stalled(now) {
            warn!(
                "no buffer published for {:?}; camera stream may be frozen, restarting worker #{}",
                self.watchdog.threshold(),
                self.worker_id
            );
            return SupervisorState::Stalled;
        }

        SupervisorState::Running
    }

    fn publish(&mut self, frame: Frame) {
        if !self.watchdog.first_frame_seen() {
            debug!(
                "first frame from capture worker #{} (seq {})",
                self.worker_id, frame.sequence
            );
            self.escalations = 0;
        }
        self.watchdog.beat(Instant::now());
        self.shared.latest.store(Arc::new(frame));
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frame_source_frames_published_total").increment(1);
    }

    fn retire_worker(&mut self) -> SupervisorState {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        // A stuck worker cannot be joined; it exits on its own once its
        // device call returns and it sees the new generation.
        self.worker = None;
        self.shared.restarts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frame_source_worker_restarts_total").increment(1);
        SupervisorState::Restarting
    }

    fn spawn_worker(&mut self) -> std::io::Result<()> {
        let id = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let device = self.device.clone();
        let publisher = self.handoff.publisher();
        let shared = self.shared.clone();
        let handle = spawn_thread(format!("capture-worker-{id}"), move || {
            capture_worker(id, device, publisher, shared)
        })?;
        self.worker = Some(handle);
        self.worker_id = id;
        self.watchdog.record_spawn(Instant::now());
        debug!("created capture worker #{id}");
        Ok(())
    }

    fn reacquire(&mut self) -> Result<(), CaptureError> {
        self.escalations += 1;
        self.shared.escalations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frame_source_escalations_total").increment(1);
        if self.escalations > self.config.max_escalations {
            return Err(CaptureError::DeviceFatal {
                escalations: self.escalations - 1,
            });
        }

        warn!(
            "capture workers are dying too quickly; reacquiring device (escalation {}/{})",
            self.escalations, self.config.max_escalations
        );
        if !self.device_lost {
            self.force_close();
        }
        self.device_lost = true;

        let opener = self.opener.clone();
        let opened = run_with_deadline("camera-open", self.config.device_op_timeout, move || {
            open_and_start(opener.as_ref())
        });
        match opened {
            Some(Ok(device)) => {
                info!("camera reacquired ({})", device.describe());
                self.device = device;
                self.device_lost = false;
                Ok(())
            }
            Some(Err(err)) => Err(err),
            None => Err(CaptureError::Timeout(self.config.device_op_timeout)),
        }
    }

    /// Stop then close the device, each on a transient thread bounded by the
    /// device operation timeout.
    fn force_close(&self) {
        let timeout = self.config.device_op_timeout;

        let device = self.device.clone();
        match run_with_deadline("camera-stop", timeout, move || device.stop()) {
            Some(Ok(())) => debug!("camera stopped"),
            Some(Err(err)) => warn!("error stopping camera, continuing anyway: {err}"),
            None => warn!("camera stop did not return within {timeout:?}"),
        }

        let device = self.device.clone();
        match run_with_deadline("camera-close", timeout, move || device.close()) {
            Some(Ok(())) => debug!("camera closed"),
            Some(Err(err)) => warn!("error closing camera, continuing anyway: {err}"),
            None => warn!("camera close did not return within {timeout:?}"),
        }
    }
}

/// Body of one worker generation.
fn capture_worker(
    id: u64,
    device: Arc<dyn CameraDevice>,
    publisher: HandoffPublisher,
    shared: Arc<Shared>,
) {
    let is_current = |shared: &Shared| shared.generation.load(Ordering::SeqCst) == id;

    while shared.running.load(Ordering::Relaxed) {
        if !is_current(&shared) {
            debug!("capture worker #{id} is no longer needed, exiting");
            break;
        }

        let buffer = match device.capture() {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!("capture worker #{id} failed: {err}");
                break;
            }
        };

        if !is_current(&shared) {
            break;
        }

        let frame = Frame {
            data: buffer.data,
            width: buffer.width,
            height: buffer.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            sequence: shared.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            format: buffer.format,
        };
        if !publisher.publish(frame) {
            break;
        }
    }

    debug!("capture worker #{id} has exited");
}
