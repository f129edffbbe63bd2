//! Platform contracts for the event loop and the content sharing picker.
//!
//! The bridge only sequences start → ready → run task → stop → restore; the
//! loop itself and the picker singleton are opaque resources behind these
//! traits, with implementations selected at compile time.

pub mod headless;
#[cfg(target_os = "macos")]
pub mod macos;

use futures_util::future::LocalBoxFuture;
use parking_lot::Mutex;
use scbridge_common::{ActivationPolicy, PickerConfiguration, PlatformError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use headless::{ConsolePicker, HeadlessLoop};
#[cfg(target_os = "macos")]
pub use macos::{AppKitLoop, SharedFilter, SystemPicker};

/// Work scheduled onto the loop thread.
///
/// The closure crosses threads; the future it builds stays on the loop thread.
pub type LoopTask = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()> + Send>;

/// Receives the loop's "finished launching" notification.
pub trait LoopDelegate: Send + Sync {
    /// Called on the loop thread once the loop is ready to dispatch tasks.
    fn did_finish_launching(&self);
}

/// A single-threaded, callback-driven event loop owned by one thread.
pub trait EventLoop: Send + Sync + 'static {
    /// Opaque handle to whatever delegate is installed, saved and restored as a unit.
    type DelegateHandle: Clone + Send + 'static;

    /// Whether the loop is currently dispatching events.
    fn is_running(&self) -> bool;

    /// Whether the current thread is the one dispatching the loop.
    fn is_loop_thread(&self) -> bool;

    /// Whether `run` may be called from the current thread.
    fn can_run_on_current_thread(&self) -> bool;

    /// Run the loop until stopped, blocking the calling thread.
    ///
    /// Where events are dispatched is up to the platform: AppKit dispatches
    /// on the calling (main) thread, the headless loop on a thread of its own.
    /// The installed delegate receives `did_finish_launching` once the loop
    /// is ready, on every call.
    fn run(&self) -> Result<(), PlatformError>;

    /// Ask the loop to stop. Honoured only after the loop dispatches its next event.
    fn stop(&self);

    /// Enqueue a no-op event at the front of the queue so a pending stop is seen.
    fn post_synthetic_event(&self);

    fn activation_policy(&self) -> ActivationPolicy;

    fn set_activation_policy(&self, policy: ActivationPolicy);

    fn delegate(&self) -> Self::DelegateHandle;

    fn set_delegate(&self, delegate: Self::DelegateHandle);

    /// Wrap a bridge delegate into something `set_delegate` accepts.
    fn make_delegate(&self, delegate: Arc<dyn LoopDelegate>) -> Self::DelegateHandle;

    /// Schedule a task on the loop thread. Safe to call from any thread.
    fn spawn(&self, task: LoopTask);
}

/// Receives the terminal outcome of one picker presentation.
///
/// Exactly one method is expected per presentation; they may be invoked on
/// any thread.
pub trait PickerObserver<F>: Send + Sync {
    fn on_selected(&self, filter: F);

    fn on_cancelled(&self);

    fn on_failed(&self, error: PlatformError);
}

/// The process-wide content sharing picker.
///
/// Implementations must not hold internal locks while invoking observer
/// callbacks: observers remove themselves from inside the callback.
pub trait SharingPicker: Send + Sync + 'static {
    /// Whatever the picker hands back on selection.
    type Filter: Send + 'static;

    /// The slot a presentation claims before registering its observer.
    ///
    /// Every handle onto the same underlying picker must return the same
    /// slot, so that at most one registration is live at a time.
    fn presentation_slot(&self) -> &PresentationSlot;

    fn add_observer(&self, observer: Arc<dyn PickerObserver<Self::Filter>>);

    /// Remove an observer previously added, matched by identity.
    fn remove_observer(&self, observer: &Arc<dyn PickerObserver<Self::Filter>>);

    fn set_configuration(&self, config: &PickerConfiguration);

    fn present(&self);
}

/// Claimed by at most one presentation at a time.
#[derive(Debug, Default)]
pub struct PresentationSlot {
    claimed: AtomicBool,
}

impl PresentationSlot {
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    /// Claim the slot. Returns `false` while someone else holds it.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.claimed.store(false, Ordering::SeqCst);
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

/// Observers attached to a picker, matched by identity, each with whatever
/// the platform keeps alongside it.
pub struct ObserverList<F, T = ()> {
    entries: Mutex<Vec<(Arc<dyn PickerObserver<F>>, T)>>,
}

impl<F, T> ObserverList<F, T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, observer: Arc<dyn PickerObserver<F>>, data: T) {
        self.entries.lock().push((observer, data));
    }

    /// Remove `observer`. Returns its data and whether the list is now empty,
    /// or `None` if it was not attached.
    pub fn remove(&self, observer: &Arc<dyn PickerObserver<F>>) -> Option<(T, bool)> {
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|(existing, _)| same_observer(existing, observer))?;
        let (_, data) = entries.remove(index);
        Some((data, entries.is_empty()))
    }

    /// The attached observers, cloned so callbacks run without the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn PickerObserver<F>>> {
        self.entries
            .lock()
            .iter()
            .map(|(observer, _)| Arc::clone(observer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<F, T> Default for ObserverList<F, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity comparison for observer handles, ignoring vtable pointers.
fn same_observer<F>(
    a: &Arc<dyn PickerObserver<F>>,
    b: &Arc<dyn PickerObserver<F>>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
