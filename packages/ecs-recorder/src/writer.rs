//! Background-thread recording writer.
//!
//! The file handle is owned exclusively by the worker thread; callers only
//! ever touch the bounded channel. `blocking` captures wait for a write ack,
//! `non-blocking` captures enqueue and return immediately, trading durability
//! latency for not stalling the simulation thread.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;

use crate::capture::{build_delta_payload, build_keyframe_payload, Bindings};
use crate::error::{RecorderError, RecorderResult};
use crate::frame::{write_frame, FrameType};
use crate::io_utils::{classify_io_error, retry_io_operation};

enum WriterMsg {
    Frame {
        bytes: Vec<u8>,
        ack: Option<SyncSender<RecorderResult<()>>>,
    },
    Shutdown,
}

/// Drives a background thread that owns the recording file and serializes
/// writes through a bounded channel.
pub struct AsyncRecorder {
    sender: SyncSender<WriterMsg>,
    worker: Option<JoinHandle<()>>,
    latched_error: Arc<Mutex<Option<RecorderError>>>,
    max_retries: u32,
    retry_delay_ms: u64,
    tick: u64,
    last_keyframe_tick: u64,
}

impl AsyncRecorder {
    pub fn create<P: AsRef<Path>>(path: P, config: &EcsConfig) -> RecorderResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(RecorderError::Io)?;
        Ok(Self::spawn(file, config))
    }

    fn spawn(file: File, config: &EcsConfig) -> Self {
        let (sender, receiver): (SyncSender<WriterMsg>, Receiver<WriterMsg>) =
            mpsc::sync_channel(config.recorder_queue_depth.max(1));
        let max_retries = config.recorder_max_retries;
        let retry_delay_ms = config.recorder_retry_delay_ms;
        let latched_error = Arc::new(Mutex::new(None));
        let worker_latch = Arc::clone(&latched_error);
        let worker = std::thread::Builder::new()
            .name("ecs-recorder-writer".into())
            .spawn(move || Self::worker_loop(file, receiver, max_retries, retry_delay_ms, worker_latch))
            .expect("spawn recorder writer thread");
        Self {
            sender,
            worker: Some(worker),
            latched_error,
            max_retries,
            retry_delay_ms,
            tick: 0,
            last_keyframe_tick: 0,
        }
    }

    fn worker_loop(
        file: File,
        receiver: Receiver<WriterMsg>,
        max_retries: u32,
        retry_delay_ms: u64,
        latched_error: Arc<Mutex<Option<RecorderError>>>,
    ) {
        let mut writer = BufWriter::new(file);
        while let Ok(msg) = receiver.recv() {
            match msg {
                WriterMsg::Frame { bytes, ack } => {
                    let result = retry_io_operation(
                        || {
                            writer
                                .write_all(&bytes)
                                .and_then(|_| writer.flush())
                                .map_err(|e| classify_io_error(e, "recorder write_all"))
                        },
                        max_retries,
                        retry_delay_ms,
                        "recorder frame write",
                    );
                    if let Some(ack) = ack {
                        // A closed ack channel just means the caller stopped
                        // waiting; the frame was still written.
                        let _ = ack.send(result);
                    } else if let Err(err) = result {
                        tracing::error!(error = %err, "non-blocking recorder write failed");
                        let mut slot = latched_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                }
                WriterMsg::Shutdown => break,
            }
        }
        let _ = writer.flush();
    }

    fn enqueue(&self, bytes: Vec<u8>, blocking: bool) -> RecorderResult<()> {
        if blocking {
            let (tx, rx) = mpsc::sync_channel(1);
            self.sender
                .send(WriterMsg::Frame { bytes, ack: Some(tx) })
                .map_err(|_| RecorderError::WriterPanicked("writer thread channel closed".into()))?;
            rx.recv()
                .map_err(|_| RecorderError::WriterPanicked("writer thread dropped ack channel".into()))?
        } else {
            self.sender
                .send(WriterMsg::Frame { bytes, ack: None })
                .map_err(|_| RecorderError::WriterPanicked("writer thread channel closed".into()))
        }
    }

    /// Captures a keyframe at the repository's current tick. Resets the
    /// delta baseline.
    pub fn capture_keyframe(
        &mut self,
        repo: &EntityRepository,
        bindings: &Bindings,
        blocking: bool,
    ) -> RecorderResult<()> {
        let tick = repo.global_version() as u64;
        let payload = build_keyframe_payload(repo, bindings)?;
        let mut frame = Vec::new();
        write_frame(&mut frame, FrameType::Keyframe, tick, tick, &payload)?;
        self.enqueue(frame, blocking)?;
        self.tick = tick;
        self.last_keyframe_tick = tick;
        Ok(())
    }

    /// Captures a delta frame relative to the last keyframe or delta tick.
    pub fn capture_frame(
        &mut self,
        repo: &EntityRepository,
        bindings: &Bindings,
        blocking: bool,
    ) -> RecorderResult<()> {
        let tick = repo.global_version() as u64;
        let base_tick = self.tick;
        let payload = build_delta_payload(repo, bindings, base_tick as u32)?;
        let mut frame = Vec::new();
        write_frame(&mut frame, FrameType::Delta, tick, base_tick, &payload)?;
        self.enqueue(frame, blocking)?;
        self.tick = tick;
        Ok(())
    }

    pub fn last_keyframe_tick(&self) -> u64 {
        self.last_keyframe_tick
    }

    pub fn config_retries(&self) -> (u32, u64) {
        (self.max_retries, self.retry_delay_ms)
    }

    /// Flushes the queue and closes the file. Any non-blocking write error
    /// latched by the writer thread since the last `dispose` is re-raised
    /// here instead of only reaching `tracing`.
    pub fn dispose(&mut self) -> RecorderResult<()> {
        let _ = self.sender.send(WriterMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        match self.latched_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for AsyncRecorder {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(err) = self.dispose() {
                tracing::error!(error = %err, "recorder dropped with a latched writer error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecs_core::config::EcsConfig;
    use tempfile::NamedTempFile;

    #[test]
    fn dispose_surfaces_latched_non_blocking_write_error() {
        let repo = EntityRepository::new(EcsConfig::default()).unwrap();
        let bindings = Bindings {
            unmanaged: &[],
            managed: &[],
        };
        let mut config = EcsConfig::default();
        config.recorder_max_retries = 0;
        // /dev/full opens fine but every write fails with ENOSPC, simulating
        // a disk-full writer-thread failure without racing the worker thread.
        let mut recorder = AsyncRecorder::create("/dev/full", &config).unwrap();
        recorder
            .capture_keyframe(&repo, &bindings, false)
            .expect("non-blocking enqueue itself should succeed");
        // The channel is FIFO and single-consumer, so `dispose`'s Shutdown
        // message is only handled after the queued frame write has failed
        // and latched its error.
        assert!(recorder.dispose().is_err());
    }

    #[test]
    fn keyframe_then_drop_flushes_file() {
        let repo = EntityRepository::new(EcsConfig::default()).unwrap();
        let bindings = Bindings {
            unmanaged: &[],
            managed: &[],
        };
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        {
            let mut recorder = AsyncRecorder::create(&path, &EcsConfig::default()).unwrap();
            recorder
                .capture_keyframe(&repo, &bindings, true)
                .expect("blocking keyframe capture should succeed");
        }
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty(), "worker thread must flush on drop");
    }
}
