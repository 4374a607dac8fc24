use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use frame_source::{
    CameraDevice, CaptureError, CapturedBuffer, FrameFormat, FrameSource, FrameSourceConfig,
    SupervisorState, WatchdogConfig,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Stream,
    FailImmediately,
    HangForever,
}

struct ScriptedCamera {
    behaviour: Behaviour,
    hang_next: AtomicBool,
    hang_on_stop: bool,
    fail_start: bool,
    captures: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedCamera {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            hang_next: AtomicBool::new(false),
            hang_on_stop: false,
            fail_start: false,
            captures: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

impl CameraDevice for ScriptedCamera {
    fn start(&self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Other(anyhow!("stream refused to start")));
        }
        Ok(())
    }

    fn capture(&self) -> Result<CapturedBuffer, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::FailImmediately => Err(CaptureError::Other(anyhow!("sensor unplugged"))),
            Behaviour::HangForever => {
                thread::sleep(Duration::from_secs(2));
                Err(CaptureError::Other(anyhow!("hung capture returned")))
            }
            Behaviour::Stream => {
                if self.hang_next.swap(false, Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(800));
                    return Err(CaptureError::Other(anyhow!("frozen stream")));
                }
                thread::sleep(Duration::from_millis(5));
                Ok(CapturedBuffer {
                    data: vec![0; 4 * 2 * 3],
                    width: 4,
                    height: 2,
                    format: FrameFormat::Bgr8,
                })
            }
        }
    }

    fn stop(&self) -> Result<(), CaptureError> {
        if self.hang_on_stop {
            thread::sleep(Duration::from_secs(2));
        }
        Ok(())
    }

    fn close(&self) -> Result<(), CaptureError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_config(min_restart_interval: Duration, max_escalations: u32) -> FrameSourceConfig {
    FrameSourceConfig {
        poll_timeout: Duration::from_millis(20),
        watchdog: WatchdogConfig {
            stall_timeout: Duration::from_millis(150),
            startup_grace: Duration::from_millis(300),
            min_restart_interval,
        },
        device_op_timeout: Duration::from_millis(100),
        shutdown_grace: Duration::from_millis(500),
        max_escalations,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn fixed_opener(
    camera: Arc<ScriptedCamera>,
    opens: Arc<AtomicUsize>,
) -> impl Fn() -> Result<Arc<dyn CameraDevice>, CaptureError> + Send + Sync {
    move || {
        opens.fetch_add(1, Ordering::SeqCst);
        Ok(camera.clone() as Arc<dyn CameraDevice>)
    }
}

#[test]
fn frames_flow_and_sequence_increases() {
    let camera = Arc::new(ScriptedCamera::new(Behaviour::Stream));
    let opens = Arc::new(AtomicUsize::new(0));
    let mut source = FrameSource::new(
        fixed_opener(camera, opens.clone()),
        fast_config(Duration::from_secs(5), 3),
    );

    assert!(source.latest_frame().is_none());
    source.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || source.latest_frame().is_some()));
    let first = source.latest_frame().unwrap().sequence;
    assert!(wait_until(Duration::from_secs(2), || {
        source.latest_frame().is_some_and(|frame| frame.sequence > first)
    }));

    let frame = source.latest_frame().unwrap();
    assert_eq!((frame.width, frame.height), (4, 2));
    assert!(frame.timestamp_ms > 0);
    assert_eq!(source.state(), SupervisorState::Running);
    assert!(source.check_health().is_ok());

    source.stop();
    assert_eq!(source.state(), SupervisorState::Stopped);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[test]
fn stalled_worker_is_replaced_without_reopening() {
    let camera = Arc::new(ScriptedCamera::new(Behaviour::Stream));
    let opens = Arc::new(AtomicUsize::new(0));
    let mut source = FrameSource::new(
        fixed_opener(camera.clone(), opens.clone()),
        fast_config(Duration::from_millis(10), 3),
    );
    source.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || source.latest_frame().is_some()));

    camera.hang_next.store(true, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(3), || source.restarts() >= 1));

    let before = source.frames_published();
    assert!(wait_until(Duration::from_secs(2), || source.frames_published() > before));
    assert_eq!(source.escalations(), 0);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    source.stop();
}

#[test]
fn rapid_worker_deaths_reacquire_the_device() {
    let broken = Arc::new(ScriptedCamera::new(Behaviour::FailImmediately));
    let opens = Arc::new(AtomicUsize::new(0));
    let opener = {
        let broken = broken.clone();
        let opens = opens.clone();
        move || {
            let attempt = opens.fetch_add(1, Ordering::SeqCst);
            let device: Arc<dyn CameraDevice> = if attempt == 0 {
                broken.clone()
            } else {
                Arc::new(ScriptedCamera::new(Behaviour::Stream))
            };
            Ok::<_, CaptureError>(device)
        }
    };

    let mut source = FrameSource::new(opener, fast_config(Duration::from_secs(5), 3));
    source.start().unwrap();

    assert!(wait_until(Duration::from_secs(3), || source.latest_frame().is_some()));
    assert!(opens.load(Ordering::SeqCst) >= 2);
    assert!(source.escalations() >= 1);
    assert!(broken.closed.load(Ordering::SeqCst));
    assert!(source.check_health().is_ok());
    source.stop();
}

#[test]
fn exhausted_escalation_budget_is_fatal() {
    let opens = Arc::new(AtomicUsize::new(0));
    let opener = {
        let opens = opens.clone();
        move || {
            opens.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CaptureError>(
                Arc::new(ScriptedCamera::new(Behaviour::FailImmediately)) as Arc<dyn CameraDevice>,
            )
        }
    };

    let mut source = FrameSource::new(opener, fast_config(Duration::from_secs(5), 2));
    source.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || source.check_health().is_err()));
    match source.check_health() {
        Err(CaptureError::DeviceFatal { escalations }) => assert_eq!(escalations, 2),
        other => panic!("expected DeviceFatal, got {other:?}"),
    }
    assert_eq!(source.state(), SupervisorState::Failed);
    assert_eq!(opens.load(Ordering::SeqCst), 3);
    assert!(source.latest_frame().is_none());
    source.stop();
}

#[test]
fn stop_returns_while_device_calls_hang() {
    let mut camera = ScriptedCamera::new(Behaviour::HangForever);
    camera.hang_on_stop = true;
    let camera = Arc::new(camera);
    let opens = Arc::new(AtomicUsize::new(0));
    let mut source = FrameSource::new(
        fixed_opener(camera.clone(), opens),
        fast_config(Duration::from_secs(5), 3),
    );
    source.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || {
        camera.captures.load(Ordering::SeqCst) > 0
    }));

    let started = Instant::now();
    source.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(source.latest_frame().is_none());
}

#[test]
fn start_is_idempotent_but_not_after_stop() {
    let camera = Arc::new(ScriptedCamera::new(Behaviour::Stream));
    let opens = Arc::new(AtomicUsize::new(0));
    let mut source = FrameSource::new(
        fixed_opener(camera, opens.clone()),
        fast_config(Duration::from_secs(5), 3),
    );

    source.start().unwrap();
    source.start().unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    source.stop();
    source.stop();
    assert!(matches!(source.start(), Err(CaptureError::Stopped)));
}

#[test]
fn open_failures_surface_from_start() {
    let opener = || -> Result<Arc<dyn CameraDevice>, CaptureError> {
        Err(CaptureError::Open {
            uri: "/dev/video9".to_string(),
        })
    };
    let mut source = FrameSource::new(opener, FrameSourceConfig::default());
    assert!(matches!(source.start(), Err(CaptureError::Open { .. })));
    assert_eq!(source.state(), SupervisorState::Idle);
}

#[test]
fn device_that_fails_to_start_is_closed() {
    let camera = Arc::new(ScriptedCamera {
        fail_start: true,
        ..ScriptedCamera::new(Behaviour::Stream)
    });
    let opens = Arc::new(AtomicUsize::new(0));
    let mut source = FrameSource::new(
        fixed_opener(camera.clone(), opens.clone()),
        fast_config(Duration::from_secs(5), 3),
    );

    assert!(matches!(source.start(), Err(CaptureError::Other(_))));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(camera.closed.load(Ordering::SeqCst));
    assert_eq!(source.state(), SupervisorState::Idle);
}
