use futures::FutureExt;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::errors::Result;

/// Bounded pool of background threads for decode and buffer-fill work.
pub struct StageRuntime {
    runtime: Runtime,
}

impl StageRuntime {
    pub fn new(worker_threads: usize) -> Result<Self> {
        let threads = worker_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("myth-stream-stage")
            .build()?;
        log::debug!("Stage runtime started with {threads} blocking threads");
        Ok(Self { runtime })
    }

    /// Runs `f` on a blocking thread.
    pub fn spawn_blocking<F, R>(&self, f: F) -> StageTask<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        StageTask {
            handle: Some(self.runtime.spawn_blocking(f)),
        }
    }
}

/// Handle to one background task, polled without blocking.
pub struct StageTask<R> {
    handle: Option<JoinHandle<R>>,
}

impl<R> StageTask<R> {
    /// Takes the task output once it has finished.
    ///
    /// A panic inside the task is resumed on the calling thread: tasks only
    /// panic on invariant violations.
    pub fn try_take(&mut self) -> Option<Result<R>> {
        if !self.handle.as_ref()?.is_finished() {
            return None;
        }
        let handle = self.handle.take()?;
        match handle.now_or_never()? {
            Ok(output) => Some(Ok(output)),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Some(Err(err.into())),
        }
    }

    /// `true` once the output has been taken.
    #[inline]
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.handle.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn wait<R>(task: &mut StageTask<R>) -> Result<R> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(output) = task.try_take() {
                return output;
            }
            assert!(Instant::now() < deadline, "stage task never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn output_is_taken_once() {
        let runtime = StageRuntime::new(2).unwrap();
        let mut task = runtime.spawn_blocking(|| 7);
        assert_eq!(wait(&mut task).unwrap(), 7);
        assert!(task.is_taken());
        assert!(task.try_take().is_none());
    }

    #[test]
    #[should_panic(expected = "invariant")]
    fn task_panics_reach_the_poller() {
        let runtime = StageRuntime::new(1).unwrap();
        let mut task = runtime.spawn_blocking(|| -> u32 { panic!("invariant") });
        let _ = wait(&mut task);
    }
}
