//! Background loader worker.
//!
//! A single dedicated thread drains a work queue of (handle, loader) pairs
//! and runs loader bodies off the game thread. The thread's life cycle:
//! waiting-for-work -> loading -> patch-handoff -> waiting-for-work, until
//! stopped. The blocking `recv` on the channel is the only suspension point;
//! closing the channel wakes and terminates a blocked worker.

use crate::handle::ResourcePtr;
use crate::loader::ResourceLoader;
use crate::manager::{PatchEntry, PatchKind, PendingQueues};
use crossbeam::channel::{self, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

pub(crate) struct WorkItem {
    pub ptr: ResourcePtr,
    pub loader: Box<dyn ResourceLoader>,
}

pub(crate) struct LoaderWorker {
    tx: Option<Sender<WorkItem>>,
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl LoaderWorker {
    pub fn spawn(pending: Arc<PendingQueues>) -> Self {
        let (tx, rx) = channel::unbounded::<WorkItem>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("resource-loader".into())
            .spawn(move || {
                while let Ok(WorkItem { ptr, mut loader }) = rx.recv() {
                    // A stop request discards this item and everything still
                    // queued; the loaders are released unexecuted when the
                    // receiver drops.
                    if stop_flag.load(Ordering::Acquire) {
                        break;
                    }
                    let resource = match loader.load(None) {
                        Ok(mut resource) => {
                            resource.meta_mut().mark_constructed();
                            Some(resource)
                        }
                        Err(err) => {
                            error!(
                                id = %loader.resource_id(),
                                "async load failed: {err}"
                            );
                            None
                        }
                    };
                    pending.patch.lock().push(PatchEntry {
                        ptr,
                        resource,
                        loader,
                        finalized: false,
                        kind: PatchKind::Initial,
                    });
                }
            })
            .expect("failed to spawn resource-loader thread");

        Self {
            tx: Some(tx),
            thread: Some(thread),
            stop,
        }
    }

    pub fn enqueue(&self, ptr: ResourcePtr, loader: Box<dyn ResourceLoader>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(WorkItem { ptr, loader });
        }
    }

    /// Request stop, wake a blocked worker and join it. Queued items are
    /// dropped without running their loaders.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.tx.take(); // closing the channel unblocks recv
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LoaderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
