//! Loop Session: run one producer under the event loop.
//!
//! If the loop is already running the producer is scheduled onto it and the
//! caller blocks for the result. Otherwise the session saves the activation
//! policy and delegate, installs its own delegate, runs the loop (blocking
//! the calling thread) until the producer and any guest tasks are done, then
//! restores what it saved before handing the result back.

use crate::lease::{LoopLease, Participant};
use crate::platform::{EventLoop, LoopDelegate, LoopTask};
use futures_util::FutureExt;
use parking_lot::Mutex;
use scbridge_common::{ActivationPolicy, BridgeError};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{mpsc, Arc};
use tracing::{debug, error, info, warn};

/// Global state captured when a session takes ownership of the loop.
struct SavedState<D> {
    policy: ActivationPolicy,
    delegate: D,
    /// Keeps the installed delegate alive while the loop only holds it weakly.
    installed: D,
}

/// Settings a session applies while it owns the loop.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Switch `Prohibited` to `Accessory` while running.
    pub promote_prohibited_policy: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            promote_prohibited_policy: true,
        }
    }
}

/// The event loop together with everything that guards it.
pub struct LoopHost<L: EventLoop> {
    pub(crate) event_loop: L,
    pub(crate) lease: LoopLease,
    saved: Mutex<Option<SavedState<L::DelegateHandle>>>,
    pub(crate) options: SessionOptions,
}

impl<L: EventLoop> LoopHost<L> {
    pub fn new(event_loop: L, options: SessionOptions) -> Self {
        Self {
            event_loop,
            lease: LoopLease::new(),
            saved: Mutex::new(None),
            options,
        }
    }

    /// Put back the saved policy and delegate. Does nothing once already restored.
    fn restore(&self) {
        let Some(saved) = self.saved.lock().take() else {
            return;
        };
        self.event_loop.set_activation_policy(saved.policy);
        self.event_loop.set_delegate(saved.delegate);
        drop(saved.installed);
        debug!(policy = %saved.policy, "Restored activation policy and delegate");
    }

    /// Last participant out: restore, wake the loop, stop it. Runs on the loop thread.
    fn shut_down(&self) {
        self.restore();
        self.event_loop.post_synthetic_event();
        self.event_loop.stop();
        info!("Event loop stop requested");
    }

    /// Mark a participant done and stop the loop if it was the last one.
    fn finish(&self, participant: Participant) {
        if self.lease.finish(participant) {
            self.shut_down();
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Await the producer, turning a panic into an error value.
async fn run_producer<T, E, F, Fut>(producer: F) -> Result<T, E>
where
    E: From<BridgeError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match AssertUnwindSafe(async move { producer().await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload);
            error!("Producer panicked: {}", message);
            Err(BridgeError::ProducerPanicked(message).into())
        }
    }
}

/// Hands the owner's producer to the loop once it finished launching.
struct SessionDelegate {
    epoch: u64,
    launch: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl LoopDelegate for SessionDelegate {
    fn did_finish_launching(&self) {
        let launch = self.launch.lock().take();
        match launch {
            Some(launch) => {
                debug!(epoch = self.epoch, "Loop finished launching");
                launch();
            }
            None => warn!(epoch = self.epoch, "Loop reported launch twice; ignoring"),
        }
    }
}

/// One producer run under the loop.
pub struct LoopSession<L: EventLoop> {
    host: Arc<LoopHost<L>>,
}

impl<L: EventLoop> LoopSession<L> {
    pub fn new(host: Arc<LoopHost<L>>) -> Self {
        Self { host }
    }

    /// Run `producer` on the loop thread and return its result.
    ///
    /// Blocks the calling thread. Starts the loop if nobody is running it,
    /// otherwise schedules onto the running loop.
    pub fn run<T, E, F, Fut>(self, producer: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<BridgeError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        let host = &self.host;
        if host.event_loop.is_running() && host.event_loop.is_loop_thread() {
            return Err(BridgeError::Reentrant.into());
        }

        let participant = host.lease.acquire(|| host.event_loop.is_running());
        match participant {
            Participant::Owner { epoch } => self.run_as_owner(epoch, producer),
            Participant::Guest { .. } | Participant::Hosted => {
                if host.event_loop.is_loop_thread() {
                    host.finish(participant);
                    return Err(BridgeError::Reentrant.into());
                }
                self.run_direct(participant, producer)
            }
        }
    }

    /// DirectRun: schedule onto the running loop and wait for the result.
    fn run_direct<T, E, F, Fut>(self, participant: Participant, producer: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<BridgeError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        debug!(?participant, "Scheduling producer on running loop");
        let (tx, rx) = mpsc::sync_channel::<Result<T, E>>(1);
        let host = Arc::clone(&self.host);
        let task: LoopTask = Box::new(move || {
            async move {
                let result = run_producer(producer).await;
                let _ = tx.send(result);
                host.finish(participant);
            }
            .boxed_local()
        });
        self.host.event_loop.spawn(task);

        rx.recv().unwrap_or_else(|_| {
            warn!("Loop dropped the producer before it finished");
            Err(BridgeError::MissingResult.into())
        })
    }

    /// Owner: save state, install our delegate, run the loop, restore.
    fn run_as_owner<T, E, F, Fut>(self, epoch: u64, producer: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<BridgeError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        let host = &self.host;
        let event_loop = &host.event_loop;

        if !event_loop.can_run_on_current_thread() {
            host.lease.release(epoch);
            return Err(BridgeError::WrongThread.into());
        }

        let result_slot: Arc<Mutex<Option<Result<T, E>>>> = Arc::new(Mutex::new(None));

        let launch: Box<dyn FnOnce() + Send> = {
            let host = Arc::clone(host);
            let result_slot = Arc::clone(&result_slot);
            Box::new(move || {
                host.lease.mark_running(epoch);
                let task_host = Arc::clone(&host);
                host.event_loop.spawn(Box::new(move || {
                    async move {
                        let result = run_producer(producer).await;
                        *result_slot.lock() = Some(result);
                        task_host.finish(Participant::Owner { epoch });
                    }
                    .boxed_local()
                }));
            })
        };
        let delegate = Arc::new(SessionDelegate {
            epoch,
            launch: Mutex::new(Some(launch)),
        });

        let policy = event_loop.activation_policy();
        let installed = event_loop.make_delegate(delegate);
        let previous = event_loop.delegate();
        event_loop.set_delegate(installed.clone());
        *host.saved.lock() = Some(SavedState {
            policy,
            delegate: previous,
            installed,
        });
        if policy == ActivationPolicy::Prohibited && host.options.promote_prohibited_policy {
            event_loop.set_activation_policy(ActivationPolicy::Accessory);
        }

        info!(epoch, "Starting event loop");
        let outcome = event_loop.run();
        info!(epoch, "Event loop returned");

        // No-op when the last participant already restored on the loop thread
        host.restore();
        host.lease.release(epoch);

        if let Err(e) = outcome {
            error!("Event loop failed: {}", e);
            return Err(BridgeError::PlatformFailure(e).into());
        }

        let result = result_slot.lock().take();
        result.unwrap_or_else(|| Err(BridgeError::MissingResult.into()))
    }
}
