//! Worker Base (C2): a reusable long-lived agent scaffold with a bounded inbox, a single
//! processing loop, and drain-on-stop. Every C3/C4/C5/C8 worker is an instance of
//! `Worker<H>` parameterised over its own task type and handler.
//!
//! Grounded in the actor/handle split used for bot lifecycles elsewhere in this workspace:
//! the long-lived task owns the loop and all mutable state, a cheaply cloneable handle owns
//! only the send side of its inbox.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Implemented once per worker kind (Data Fetcher, RSI Calculator, Database Manager,
/// Display Agent). `Task` is that worker's own unit of work — typically one enum variant
/// per event subscription it handles.
#[async_trait]
pub trait WorkerHandler: Send + 'static {
    type Task: Send + 'static;

    /// Processes exactly one task. Errors are caught by the worker loop, logged, and do not
    /// stop delivery of subsequent tasks (class 3, HandlerException).
    async fn handle(&mut self, task: Self::Task) -> anyhow::Result<()>;
}

enum Message<T> {
    Task(T),
    Stop,
}

/// Send-only handle to a running worker's inbox. Cheap to clone; any number of producers
/// (Orchestrator, other workers) may hold one.
#[derive(Clone)]
pub struct WorkerHandle<T> {
    name: Arc<str>,
    tx: mpsc::Sender<Message<T>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Enqueues one task. Blocks if the inbox is full (the bounded back-pressure behaviour
    /// from §5) until space frees up or the worker has stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker's loop has already exited and its inbox is closed.
    pub async fn submit(&self, task: T) -> anyhow::Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Message::Task(task)).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("worker '{}' inbox is closed", self.name);
        }
        Ok(())
    }

    /// Injects the stop sentinel. Does not itself wait for the loop to exit — hold on to the
    /// `JoinHandle` returned by `spawn` for that (see `WorkerHandle::join_on_stop` pattern in
    /// callers, or simply `.await` the join handle after calling this).
    pub async fn request_stop(&self) {
        let _ = self.tx.send(Message::Stop).await;
    }

    /// Returns once the inbox is empty and the last in-flight task has finished, or `timeout`
    /// elapses first (in which case this returns `false`).
    pub async fn wait_for_queue_completion(&self, timeout: Duration) -> bool {
        if self.pending.load(Ordering::SeqCst) == 0 {
            return true;
        }
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.idle.notified();
                if self.pending.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

/// Type-erased view of a `WorkerHandle<T>` exposing only the lifecycle operations the
/// Orchestrator needs to sequence shutdown across workers of different `Task` types.
#[async_trait]
pub trait Stoppable: Send + Sync {
    async fn request_stop(&self);
    async fn wait_for_queue_completion(&self, timeout: Duration) -> bool;
}

#[async_trait]
impl<T: Send + 'static> Stoppable for WorkerHandle<T> {
    async fn request_stop(&self) {
        WorkerHandle::request_stop(self).await;
    }

    async fn wait_for_queue_completion(&self, timeout: Duration) -> bool {
        WorkerHandle::wait_for_queue_completion(self, timeout).await
    }
}

/// Binds a bus subscription to a worker's inbox: every event the bus forwards to `bus_rx` is
/// translated by `map` into that worker's own `Task` type and submitted. Events `map` turns
/// into `None` (a topic the worker is subscribed to but does not act on for this variant) are
/// silently dropped. This is the "the base binds them to the service bus at start" half of
/// the Worker Base contract — one forwarding task per subscriber, so a slow or wedged worker
/// only ever back-pressures its own inbox, never another subscriber's delivery.
pub fn forward_from_bus<E, T>(
    mut bus_rx: mpsc::Receiver<E>,
    handle: WorkerHandle<T>,
    map: impl Fn(E) -> Option<T> + Send + 'static,
) -> JoinHandle<()>
where
    E: Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = bus_rx.recv().await {
            if let Some(task) = map(event) {
                if handle.submit(task).await.is_err() {
                    break;
                }
            }
        }
    })
}

/// Spawns the worker loop on its own Tokio task and returns a handle to submit work plus the
/// `JoinHandle` to await its exit after `request_stop`.
pub fn spawn<H: WorkerHandler>(name: impl Into<String>, handler: H, capacity: usize) -> (WorkerHandle<H::Task>, JoinHandle<()>) {
    let name: Arc<str> = Arc::from(name.into());
    let (tx, rx) = mpsc::channel(capacity);
    let pending = Arc::new(AtomicUsize::new(0));
    let idle = Arc::new(Notify::new());

    let handle = WorkerHandle {
        name: Arc::clone(&name),
        tx,
        pending: Arc::clone(&pending),
        idle: Arc::clone(&idle),
    };

    let join = tokio::spawn(run_loop(name, handler, rx, pending, idle));
    (handle, join)
}

async fn run_loop<H: WorkerHandler>(
    name: Arc<str>,
    mut handler: H,
    mut rx: mpsc::Receiver<Message<H::Task>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
) {
    info!(worker = %name, "started");
    while let Some(message) = rx.recv().await {
        match message {
            Message::Stop => break,
            Message::Task(task) => {
                if let Err(err) = handler.handle(task).await {
                    error!(worker = %name, error = %err, "task failed");
                }
                if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                    idle.notify_waiters();
                }
            }
        }
    }
    info!(worker = %name, "stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::sleep;

    struct Recorder {
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl WorkerHandler for Recorder {
        type Task = u32;

        async fn handle(&mut self, task: Self::Task) -> anyhow::Result<()> {
            if task == 0 {
                anyhow::bail!("zero is not allowed");
            }
            sleep(Duration::from_millis(5)).await;
            self.seen.lock().unwrap().push(task);
            Ok(())
        }
    }

    #[tokio::test]
    async fn forward_from_bus_translates_and_drops_unmapped_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, join) = spawn("recorder", Recorder { seen: Arc::clone(&seen) }, 16);
        let (bus_tx, bus_rx) = mpsc::channel::<i32>(16);
        let forwarder = forward_from_bus(bus_rx, handle.clone(), |event| {
            if event < 0 {
                None
            } else {
                Some(event as u32)
            }
        });

        bus_tx.send(-1).await.unwrap();
        bus_tx.send(1).await.unwrap();
        bus_tx.send(2).await.unwrap();
        drop(bus_tx);
        forwarder.await.unwrap();

        handle.request_stop().await;
        join.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn processes_tasks_in_fifo_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, join) = spawn("recorder", Recorder { seen: Arc::clone(&seen) }, 16);
        for i in 1..=5 {
            handle.submit(i).await.unwrap();
        }
        handle.request_stop().await;
        join.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn handler_error_does_not_stop_the_loop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, join) = spawn("recorder", Recorder { seen: Arc::clone(&seen) }, 16);
        handle.submit(0).await.unwrap();
        handle.submit(1).await.unwrap();
        handle.request_stop().await;
        join.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn wait_for_queue_completion_returns_once_drained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (handle, join) = spawn("recorder", Recorder { seen: Arc::clone(&seen) }, 16);
        handle.submit(1).await.unwrap();
        handle.submit(2).await.unwrap();
        let drained = handle.wait_for_queue_completion(Duration::from_secs(1)).await;
        assert!(drained);
        handle.request_stop().await;
        join.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_queue_completion_times_out_when_blocked() {
        struct Blocker;
        #[async_trait]
        impl WorkerHandler for Blocker {
            type Task = ();
            async fn handle(&mut self, _task: ()) -> anyhow::Result<()> {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }
        let (handle, _join) = spawn("blocker", Blocker, 16);
        handle.submit(()).await.unwrap();
        let drained = handle.wait_for_queue_completion(Duration::from_millis(20)).await;
        assert!(!drained);
    }
}
