//! Per-room work queues: jobs for the same room run one at a time in arrival order, jobs for
//! different rooms run concurrently. Each room gets a worker task on first use.
//!
//! Queues are unbounded so the caller never waits on one room's backlog; a room whose
//! outbound calls hang only delays its own messages.

use crate::channels::Network;
use crate::session::RoomKey;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

type Job = BoxFuture<'static, ()>;

struct RoomQueue {
    tx: mpsc::UnboundedSender<Job>,
    /// Jobs queued or running on this room's worker.
    pending: Arc<AtomicUsize>,
}

pub struct RoomQueues {
    queues: Mutex<HashMap<RoomKey, RoomQueue>>,
}

impl Default for RoomQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomQueues {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queue `job` behind earlier jobs for the same room. Never waits on the room's backlog.
    pub async fn dispatch(&self, key: RoomKey, job: Job) {
        let mut job = job;
        let mut g = self.queues.lock().await;
        // A closed queue means its worker is gone; start a new one and retry once.
        for _ in 0..2 {
            let queue = g
                .entry(key.clone())
                .or_insert_with(|| spawn_room_worker(&key));
            queue.pending.fetch_add(1, Ordering::SeqCst);
            match queue.tx.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    log::warn!("room queue for {} was closed; restarting it", key);
                    g.remove(&key);
                    job = returned;
                }
            }
        }
        log::error!("dropping message for {}: room queue unavailable", key);
    }

    /// Rooms with a live queue.
    pub async fn rooms(&self) -> Vec<RoomKey> {
        self.queues.lock().await.keys().cloned().collect()
    }

    /// Jobs queued or running for a room.
    pub async fn pending(&self, key: &RoomKey) -> usize {
        self.queues
            .lock()
            .await
            .get(key)
            .map_or(0, |q| q.pending.load(Ordering::SeqCst))
    }

    /// Close a room's queue unless it has queued or running jobs. Returns true when the room
    /// has no queue afterwards. The next job for the room starts a fresh worker.
    pub async fn close_if_idle(&self, key: &RoomKey) -> bool {
        let mut g = self.queues.lock().await;
        match g.get(key) {
            Some(queue) if queue.pending.load(Ordering::SeqCst) > 0 => false,
            Some(_) => {
                g.remove(key);
                true
            }
            None => true,
        }
    }

    /// Close every idle queue on `network`; returns the closed rooms.
    pub async fn close_idle_on(&self, network: Network) -> Vec<RoomKey> {
        let mut g = self.queues.lock().await;
        let idle: Vec<RoomKey> = g
            .iter()
            .filter(|(k, q)| k.network == network && q.pending.load(Ordering::SeqCst) == 0)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &idle {
            g.remove(key);
        }
        idle
    }
}

fn spawn_room_worker(key: &RoomKey) -> RoomQueue {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    tokio::spawn(run_room_worker(key.clone(), rx, pending.clone()));
    RoomQueue { tx, pending }
}

async fn run_room_worker(
    key: RoomKey,
    mut rx: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
) {
    log::debug!("room worker for {} started", key);
    while let Some(job) = rx.recv().await {
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            log::error!("job for {} panicked; continuing with the next message", key);
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    log::debug!("room worker for {} stopped", key);
}
