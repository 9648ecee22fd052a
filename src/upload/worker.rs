use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};

use super::UploadCommand;
use crate::errors::{Result, StreamError};
use crate::gpu::{CommandStream, GpuBackend};
use crate::settings::StreamingSettings;
use crate::sync::FenceLedger;

/// The secondary command stream's thread.
///
/// Each iteration sweeps the secondary ledger, waits at most one tick for
/// an upload and runs it. After an upload the loop sleeps out the rest of
/// the tick, so at most one upload is submitted per tick.
pub struct UploadWorker {
    sender: Option<Sender<UploadCommand>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UploadWorker {
    pub fn spawn(gpu: Arc<dyn GpuBackend>, settings: &StreamingSettings) -> Result<Self> {
        let (sender, receiver) = flume::bounded(settings.upload_queue_capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));

        let tick = settings.upload_tick();
        let ledger = FenceLedger::new(CommandStream::Secondary, settings.fence_poll_timeout());
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("myth-stream-upload".to_string())
            .spawn(move || run(&*gpu, &receiver, &thread_stop, tick, ledger))?;

        Ok(Self {
            sender: Some(sender),
            stop,
            thread: Some(thread),
        })
    }

    /// Queues an upload without blocking.
    ///
    /// Fails with [`StreamError::UploadQueueFull`] when the worker is behind;
    /// the caller retries on a later update.
    pub fn submit(&self, command: UploadCommand) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(StreamError::UploadWorkerDisconnected)?;
        sender.try_send(command)?;
        Ok(())
    }

    /// Uploads waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Stops the thread and waits for it. Queued uploads are dropped.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.sender = None;
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Upload worker panicked");
        }
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    gpu: &dyn GpuBackend,
    receiver: &Receiver<UploadCommand>,
    stop: &AtomicBool,
    tick: Duration,
    mut ledger: FenceLedger,
) {
    log::info!("Upload worker started on '{}'", gpu.name());

    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();
        ledger.sweep(gpu);

        match receiver.recv_timeout(tick) {
            Ok(command) => {
                let name = command.name.clone();
                let failure = command.failure.clone();
                match command.execute(gpu) {
                    Ok(fence) => ledger.track(fence),
                    Err(err) => {
                        log::error!("Failed to upload '{name}': {err}");
                        failure.set(err.to_string());
                    }
                }
                std::thread::sleep(tick.saturating_sub(started.elapsed()));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    ledger.release(gpu);
    log::info!("Upload worker stopped");
}
