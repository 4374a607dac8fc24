//! Single-slot, latest-wins hand-off primitives.
//!
//! The worker publishes into a capacity-1 channel after draining whatever is
//! still sitting in it, so the supervisor never sees a backlog. The
//! supervisor then moves frames into [`LatestFrame`], which the control loop
//! reads without blocking.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use crate::types::Frame;

/// Channel between acquisition workers and the supervisor.
pub(crate) struct Handoff {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl Handoff {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Publisher handle given to one worker generation.
    pub(crate) fn publisher(&self) -> HandoffPublisher {
        HandoffPublisher {
            tx: self.tx.clone(),
            drain: self.rx.clone(),
        }
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub(crate) struct HandoffPublisher {
    tx: Sender<Frame>,
    drain: Receiver<Frame>,
}

impl HandoffPublisher {
    /// Replace any unread frame with `frame`. Returns `false` once the
    /// supervisor side has gone away.
    pub(crate) fn publish(&self, mut frame: Frame) -> bool {
        for _ in 0..2 {
            while self.drain.try_recv().is_ok() {}
            match self.tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => frame = rejected,
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
        true
    }
}

/// Newest published frame, shared with the consumer.
#[derive(Default)]
pub(crate) struct LatestFrame {
    slot: Mutex<Option<Arc<Frame>>>,
}

impl LatestFrame {
    pub(crate) fn store(&self, frame: Arc<Frame>) {
        if let Ok(mut guard) = self.slot.lock() {
            *guard = Some(frame);
        }
    }

    pub(crate) fn load(&self) -> Option<Arc<Frame>> {
        match self.slot.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameFormat;

    fn frame(sequence: u64) -> Frame {
        Frame {
            data: Vec::new(),
            width: 0,
            height: 0,
            timestamp_ms: 0,
            sequence,
            format: FrameFormat::Rgb8,
        }
    }

    #[test]
    fn publishing_overwrites_unread_frames() {
        let handoff = Handoff::new();
        let publisher = handoff.publisher();
        assert!(publisher.publish(frame(1)));
        assert!(publisher.publish(frame(2)));
        assert!(publisher.publish(frame(3)));

        let received = handoff.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(received.sequence, 3);
        assert!(handoff.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn empty_mailbox_times_out() {
        let handoff = Handoff::new();
        assert!(matches!(
            handoff.recv_timeout(Duration::from_millis(5)),
            Err(RecvTimeoutError::Timeout)
        ));
    }

    #[test]
    fn latest_frame_keeps_only_the_newest() {
        let latest = LatestFrame::default();
        assert!(latest.load().is_none());
        latest.store(Arc::new(frame(7)));
        latest.store(Arc::new(frame(8)));
        assert_eq!(latest.load().map(|f| f.sequence), Some(8));
    }
}
