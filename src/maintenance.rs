//! Background maintenance
//!
//! Periodically gives a store the chance to defragment, from a dedicated
//! thread.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::error::StoreError;
use crate::storage::{MaintenanceBudget, Storage};

/// Thread calling [`Storage::maintenance`] on a fixed period
///
/// Each tick runs one `Within(budget)` call, repeated while the store
/// reports remaining work. Stopped by [`MaintenanceWorker::shutdown`] or on
/// drop.
pub struct MaintenanceWorker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Start the worker thread
    pub fn spawn<S>(store: Arc<S>, period: Duration, budget: Duration) -> io::Result<Self>
    where
        S: Storage + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(period);

        let handle = thread::Builder::new()
            .name("chunkstore-maintenance".to_string())
            .spawn(move || loop {
                crossbeam::select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(ticker) -> _ => Self::run_once(store.as_ref(), budget, &shutdown_rx),
                }
            })?;

        tracing::debug!("Started maintenance worker (period {:?})", period);
        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the worker and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the select
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Maintenance worker panicked");
            }
        }
    }

    /// Maintain until the store reports no remaining work or shutdown begins
    fn run_once<S>(store: &S, budget: Duration, shutdown: &Receiver<()>)
    where
        S: Storage + ?Sized,
    {
        loop {
            match store.maintenance(MaintenanceBudget::Within(budget)) {
                Ok(true) => {
                    if shutdown.try_recv() != Err(TryRecvError::Empty) {
                        return;
                    }
                }
                Ok(false) | Err(StoreError::NotOpen) => return,
                Err(e) => {
                    tracing::error!("Maintenance failed: {}", e);
                    return;
                }
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
