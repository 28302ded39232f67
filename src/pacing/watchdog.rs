//! Idle-duplication watchdog thread

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info};

use super::{FramePacer, Wake};
use crate::error::{PacerError, Result};
use crate::utils;

/// Background thread that keeps frames flowing while the renderer is idle.
///
/// Each cycle waits for a capture signal with an absolute deadline of now
/// plus the duplication interval. A real capture re-arms the wait; a
/// timeout asks the pacer to inject a duplicate. Stopped and joined on
/// [`PacerThread::stop`] or drop.
pub struct PacerThread {
    pacer: Arc<FramePacer>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PacerThread {
    pub fn spawn(pacer: Arc<FramePacer>) -> Result<Self> {
        pacer.signal.clear_stop();

        let worker = Arc::clone(&pacer);
        let handle = thread::Builder::new()
            .name("framepace-pacer".to_string())
            .spawn(move || run_pacer(worker))
            .map_err(PacerError::ThreadSpawn)?;

        Ok(Self {
            pacer,
            handle: Some(handle),
        })
    }

    pub fn pacer(&self) -> &Arc<FramePacer> {
        &self.pacer
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pacer.signal.request_stop();
            if handle.join().is_err() {
                error!("Pacer thread panicked");
            }
        }
    }
}

impl Drop for PacerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_pacer(pacer: Arc<FramePacer>) {
    if let Some(core) = pacer.config().pacing.pacer_core {
        utils::pin_current_thread(core);
    }

    let interval = pacer.duplication_interval();
    info!(
        "Pacer thread started: minimum {} fps, gap limit {:?}",
        pacer.minimum_rate(),
        interval
    );

    loop {
        // Always re-derived from the current time, never carried over.
        let deadline = Instant::now() + interval;

        match pacer.wait_for_capture(deadline) {
            Wake::Stopped => break,
            Wake::Captured | Wake::Spurious => continue,
            Wake::TimedOut => match pacer.inject_duplicate(Instant::now()) {
                Ok(Some(frame)) => debug!("Pacer filled idle gap with pts={}", frame.pts),
                Ok(None) => {}
                Err(err) => error!("Duplicate injection failed: {}", err),
            },
        }
    }

    info!("Pacer thread stopped");
}
