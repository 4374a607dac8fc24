//! Replay device that serves a directory of still images as a camera stream.

use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, anyhow};
use tracing::info;
use walkdir::WalkDir;

use crate::{
    device::CameraDevice,
    types::{CaptureError, CapturedBuffer, FrameFormat},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Serves every image under a directory in lexical order, looping forever.
pub struct ImageSequenceDevice {
    root: PathBuf,
    files: Vec<PathBuf>,
    cursor: AtomicUsize,
    frame_interval: Duration,
    streaming: AtomicBool,
    closed: AtomicBool,
    cache: Mutex<Option<(usize, CapturedBuffer)>>,
}

impl ImageSequenceDevice {
    /// Index the images below `root`. `frame_interval` paces `capture` to
    /// emulate the camera frame rate.
    pub fn open(root: impl AsRef<Path>, frame_interval: Duration) -> Result<Self, CaptureError> {
        let root = root.as_ref().to_path_buf();
        let files = find_image_files(&root);
        if files.is_empty() {
            return Err(CaptureError::Open {
                uri: root.display().to_string(),
            });
        }
        info!("found {} replay frames under {}", files.len(), root.display());
        Ok(Self {
            root,
            files,
            cursor: AtomicUsize::new(0),
            frame_interval,
            streaming: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cache: Mutex::new(None),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn load(&self, index: usize) -> Result<CapturedBuffer, CaptureError> {
        if let Ok(guard) = self.cache.lock() {
            if let Some((cached, buffer)) = guard.as_ref() {
                if *cached == index {
                    return Ok(buffer.clone());
                }
            }
        }

        let path = &self.files[index];
        let rgb = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        let buffer = CapturedBuffer {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
            format: FrameFormat::Rgb8,
        };
        if self.files.len() == 1 {
            if let Ok(mut guard) = self.cache.lock() {
                *guard = Some((index, buffer.clone()));
            }
        }
        Ok(buffer)
    }
}

impl CameraDevice for ImageSequenceDevice {
    fn start(&self) -> Result<(), CaptureError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::Open {
                uri: self.root.display().to_string(),
            });
        }
        self.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&self) -> Result<CapturedBuffer, CaptureError> {
        if !self.streaming.load(Ordering::SeqCst) {
            return Err(CaptureError::Other(anyhow!("replay stream is not running")));
        }
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.files.len();
        self.load(index)
    }

    fn stop(&self) -> Result<(), CaptureError> {
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), CaptureError> {
        self.streaming.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.root.display())
    }
}

fn find_image_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}
