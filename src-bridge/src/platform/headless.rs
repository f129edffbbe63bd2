//! Headless platform: a thread-owned event loop and a console picker.
//!
//! Used on hosts without AppKit, by the CLI there, and by the tests. The loop
//! follows the same rules as the AppKit one: [`EventLoop::run`] blocks until
//! the loop stops, a delegate is told when it is ready, and a stop request
//! takes effect only after the next event is dispatched. Events are
//! dispatched on a thread the loop starts on first use and keeps for every
//! later run, so callers may sit inside a tokio runtime of their own.

use super::{
    EventLoop, LoopDelegate, LoopTask, ObserverList, PickerObserver, PresentationSlot,
    SharingPicker,
};
use parking_lot::Mutex;
use scbridge_common::{
    ActivationPolicy, ContentSelection, PickerConfiguration, PickerMode, PlatformError, SourceKind,
};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, ThreadId};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error, trace, warn};

/// Error domain for failures raised by the headless platform.
pub const HEADLESS_ERROR_DOMAIN: &str = "scbridge.headless";

const DISPATCH_THREAD_NAME: &str = "scbridge-headless-loop";

fn failure(code: i64, message: impl Into<String>) -> PlatformError {
    PlatformError::new(HEADLESS_ERROR_DOMAIN, code, message)
}

enum LoopEvent {
    Task(LoopTask),
    Synthetic,
}

/// One `run` handed to the dispatch thread.
struct DispatchRequest {
    inbox: mpsc::UnboundedReceiver<LoopEvent>,
    done: std_mpsc::SyncSender<Result<(), PlatformError>>,
}

/// Loop state shared with the dispatch thread.
struct Shared {
    events: mpsc::UnboundedSender<LoopEvent>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<LoopEvent>>>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    loop_thread: Mutex<Option<ThreadId>>,
    policy: Mutex<ActivationPolicy>,
    delegate: Mutex<Option<Arc<dyn LoopDelegate>>>,
}

impl Shared {
    /// Dispatch events until a stop request is seen after an event.
    fn dispatch(&self, runtime: &Runtime, mut inbox: mpsc::UnboundedReceiver<LoopEvent>) {
        let local = LocalSet::new();
        self.stop_requested.store(false, Ordering::SeqCst);
        *self.loop_thread.lock() = Some(thread::current().id());
        self.running.store(true, Ordering::SeqCst);
        debug!("Headless loop running");

        local.block_on(runtime, async {
            let delegate = self.delegate.lock().clone();
            if let Some(delegate) = delegate {
                delegate.did_finish_launching();
            }

            while let Some(event) = inbox.recv().await {
                match event {
                    LoopEvent::Task(task) => {
                        tokio::task::spawn_local(task());
                    }
                    LoopEvent::Synthetic => trace!("Synthetic event dispatched"),
                }
                if self.stop_requested.swap(false, Ordering::SeqCst) {
                    break;
                }
            }
        });

        // Tasks that never completed are dropped along with their result senders
        drop(local);
        let mut dropped = 0usize;
        while let Ok(event) = inbox.try_recv() {
            if matches!(event, LoopEvent::Task(_)) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!("Dropped {} task(s) queued after stop", dropped);
        }

        self.running.store(false, Ordering::SeqCst);
        *self.loop_thread.lock() = None;
        *self.inbox.lock() = Some(inbox);
        debug!("Headless loop stopped");
    }
}

/// Body of the dispatch thread: one runtime, reused for every run.
fn dispatch_thread(shared: Arc<Shared>, requests: std_mpsc::Receiver<DispatchRequest>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string());
    if let Err(e) = &runtime {
        error!("Headless loop cannot build its runtime: {}", e);
    }

    while let Ok(request) = requests.recv() {
        let outcome = match &runtime {
            Ok(runtime) => {
                shared.dispatch(runtime, request.inbox);
                Ok(())
            }
            Err(e) => {
                *shared.inbox.lock() = Some(request.inbox);
                Err(failure(3, format!("Failed to build runtime: {}", e)))
            }
        };
        let _ = request.done.send(outcome);
    }
    debug!("Headless dispatch thread exiting");
}

/// Single-threaded event loop driven by a current-thread tokio runtime on a
/// dedicated dispatch thread.
pub struct HeadlessLoop {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<std_mpsc::Sender<DispatchRequest>>>,
    pinned_thread: Option<ThreadId>,
}

impl HeadlessLoop {
    /// A loop that may be run from any thread.
    pub fn new() -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                events,
                inbox: Mutex::new(Some(inbox)),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                loop_thread: Mutex::new(None),
                policy: Mutex::new(ActivationPolicy::Prohibited),
                delegate: Mutex::new(None),
            }),
            dispatcher: Mutex::new(None),
            pinned_thread: None,
        }
    }

    /// A loop that may only be run from the calling thread, like a main-thread UI loop.
    pub fn pinned_to_current_thread() -> Self {
        Self {
            pinned_thread: Some(thread::current().id()),
            ..Self::new()
        }
    }

    /// Set the initial activation policy.
    pub fn with_activation_policy(self, policy: ActivationPolicy) -> Self {
        *self.shared.policy.lock() = policy;
        self
    }

    /// Hand `request` to the dispatch thread, starting it on first use.
    fn submit(&self, request: DispatchRequest) -> Result<(), PlatformError> {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_none() {
            let (requests, incoming) = std_mpsc::channel();
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(DISPATCH_THREAD_NAME.to_string())
                .spawn(move || dispatch_thread(shared, incoming));
            if let Err(e) = spawned {
                *self.shared.inbox.lock() = Some(request.inbox);
                return Err(failure(3, format!("Failed to start dispatch thread: {}", e)));
            }
            debug!("Headless dispatch thread started");
            *dispatcher = Some(requests);
        }

        let Some(requests) = dispatcher.as_ref() else {
            return Err(failure(3, "Dispatch thread unavailable"));
        };
        if let Err(std_mpsc::SendError(request)) = requests.send(request) {
            *dispatcher = None;
            *self.shared.inbox.lock() = Some(request.inbox);
            return Err(failure(3, "Dispatch thread exited"));
        }
        Ok(())
    }
}

impl Default for HeadlessLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for HeadlessLoop {
    type DelegateHandle = Option<Arc<dyn LoopDelegate>>;

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn is_loop_thread(&self) -> bool {
        self.is_running() && *self.shared.loop_thread.lock() == Some(thread::current().id())
    }

    fn can_run_on_current_thread(&self) -> bool {
        self.pinned_thread
            .map_or(true, |id| id == thread::current().id())
    }

    fn run(&self) -> Result<(), PlatformError> {
        if !self.can_run_on_current_thread() {
            return Err(failure(1, "Loop cannot run on this thread"));
        }
        let inbox = self
            .shared
            .inbox
            .lock()
            .take()
            .ok_or_else(|| failure(2, "Loop is already running"))?;

        let (done, finished) = std_mpsc::sync_channel(1);
        self.submit(DispatchRequest { inbox, done })?;
        finished.recv().unwrap_or_else(|_| {
            *self.dispatcher.lock() = None;
            Err(failure(3, "Dispatch thread exited mid-run"))
        })
    }

    fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
    }

    fn post_synthetic_event(&self) {
        let _ = self.shared.events.send(LoopEvent::Synthetic);
    }

    fn activation_policy(&self) -> ActivationPolicy {
        *self.shared.policy.lock()
    }

    fn set_activation_policy(&self, policy: ActivationPolicy) {
        *self.shared.policy.lock() = policy;
    }

    fn delegate(&self) -> Self::DelegateHandle {
        self.shared.delegate.lock().clone()
    }

    fn set_delegate(&self, delegate: Self::DelegateHandle) {
        *self.shared.delegate.lock() = delegate;
    }

    fn make_delegate(&self, delegate: Arc<dyn LoopDelegate>) -> Self::DelegateHandle {
        Some(delegate)
    }

    fn spawn(&self, task: LoopTask) {
        if self.shared.events.send(LoopEvent::Task(task)).is_err() {
            warn!("Headless loop inbox closed; task dropped");
        }
    }
}

/// Picker that asks for a selection on the console.
///
/// Reads one line per presentation on a helper thread:
/// `display:<id>`, `window:<id>` or `application:<bundle id>` select content,
/// an empty line or end of input cancels.
pub struct ConsolePicker {
    observers: ObserverList<ContentSelection>,
    slot: PresentationSlot,
    config: Mutex<PickerConfiguration>,
    input: Arc<Mutex<Box<dyn BufRead + Send>>>,
    prompt: bool,
}

impl ConsolePicker {
    /// Picker reading from stdin and prompting on stderr.
    pub fn new() -> Self {
        Self {
            prompt: true,
            ..Self::from_reader(std::io::BufReader::new(std::io::stdin()))
        }
    }

    /// Picker reading selections from any line source, without prompting.
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            observers: ObserverList::new(),
            slot: PresentationSlot::new(),
            config: Mutex::new(PickerConfiguration::default()),
            input: Arc::new(Mutex::new(Box::new(reader))),
            prompt: false,
        }
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Default for ConsolePicker {
    fn default() -> Self {
        Self::new()
    }
}

/// What one line of console input amounts to.
#[derive(Debug, PartialEq)]
enum ConsoleOutcome {
    Selected(ContentSelection),
    Cancelled,
    Failed(PlatformError),
}

fn kind_allowed(kind: SourceKind, modes: PickerMode) -> bool {
    if modes.is_empty() {
        return true;
    }
    let wanted = match kind {
        SourceKind::Display => PickerMode::SINGLE_DISPLAY,
        SourceKind::Window => PickerMode::SINGLE_WINDOW | PickerMode::MULTIPLE_WINDOWS,
        SourceKind::Application => {
            PickerMode::SINGLE_APPLICATION | PickerMode::MULTIPLE_APPLICATIONS
        }
    };
    modes.bits() & wanted.bits() != 0
}

fn interpret_line(line: &str, config: &PickerConfiguration) -> ConsoleOutcome {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleOutcome::Cancelled;
    }
    let selection = match line.parse::<ContentSelection>() {
        Ok(selection) => selection,
        Err(e) => return ConsoleOutcome::Failed(PlatformError::new(HEADLESS_ERROR_DOMAIN, 22, e)),
    };
    if !kind_allowed(selection.kind, config.allowed_picker_modes) {
        return ConsoleOutcome::Failed(PlatformError::new(
            HEADLESS_ERROR_DOMAIN,
            13,
            format!(
                "{} selections are not allowed (modes: {})",
                selection.kind.as_str(),
                config.allowed_picker_modes
            ),
        ));
    }
    let excluded = match selection.kind {
        SourceKind::Window => selection
            .id
            .parse::<u32>()
            .map_or(false, |id| config.excluded_window_ids.contains(&id)),
        SourceKind::Application => config.excluded_bundle_ids.contains(&selection.id),
        SourceKind::Display => false,
    };
    if excluded {
        return ConsoleOutcome::Failed(PlatformError::new(
            HEADLESS_ERROR_DOMAIN,
            13,
            format!("{} is excluded from sharing", selection),
        ));
    }
    ConsoleOutcome::Selected(selection)
}

impl SharingPicker for ConsolePicker {
    type Filter = ContentSelection;

    fn presentation_slot(&self) -> &PresentationSlot {
        &self.slot
    }

    fn add_observer(&self, observer: Arc<dyn PickerObserver<ContentSelection>>) {
        self.observers.add(observer, ());
    }

    fn remove_observer(&self, observer: &Arc<dyn PickerObserver<ContentSelection>>) {
        self.observers.remove(observer);
    }

    fn set_configuration(&self, config: &PickerConfiguration) {
        *self.config.lock() = config.clone();
    }

    fn present(&self) {
        let observers = self.observers.snapshot();
        let config = self.config.lock().clone();
        let input = Arc::clone(&self.input);
        let prompt = self.prompt;
        debug!("Presenting console picker to {} observer(s)", observers.len());

        thread::spawn(move || {
            if prompt {
                eprint!(
                    "Select content (display:<id>, window:<id>, application:<bundle id>; empty to cancel) [modes: {}]: ",
                    config.allowed_picker_modes
                );
            }
            let mut line = String::new();
            let outcome = match input.lock().read_line(&mut line) {
                Ok(0) => ConsoleOutcome::Cancelled,
                Ok(_) => interpret_line(&line, &config),
                Err(e) => ConsoleOutcome::Failed(PlatformError::new(
                    HEADLESS_ERROR_DOMAIN,
                    5,
                    format!("Failed to read selection: {}", e),
                )),
            };
            for observer in observers {
                match &outcome {
                    ConsoleOutcome::Selected(selection) => observer.on_selected(selection.clone()),
                    ConsoleOutcome::Cancelled => observer.on_cancelled(),
                    ConsoleOutcome::Failed(error) => observer.on_failed(error.clone()),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use std::time::Duration;

    struct SignalReady(std_mpsc::Sender<()>);

    impl LoopDelegate for SignalReady {
        fn did_finish_launching(&self) {
            let _ = self.0.send(());
        }
    }

    fn start_loop() -> (Arc<HeadlessLoop>, thread::JoinHandle<()>) {
        let event_loop = Arc::new(HeadlessLoop::new());
        let (tx, rx) = std_mpsc::channel();
        event_loop.set_delegate(event_loop.make_delegate(Arc::new(SignalReady(tx))));
        let runner = Arc::clone(&event_loop);
        let handle = thread::spawn(move || runner.run().unwrap());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        (event_loop, handle)
    }

    #[test]
    fn test_stop_waits_for_next_event() {
        let (event_loop, handle) = start_loop();
        assert!(event_loop.is_running());

        event_loop.stop();
        thread::sleep(Duration::from_millis(100));
        assert!(event_loop.is_running(), "stop alone must not end the loop");

        event_loop.post_synthetic_event();
        handle.join().unwrap();
        assert!(!event_loop.is_running());
    }

    #[test]
    fn test_spawned_task_runs_on_loop_thread() {
        let (event_loop, handle) = start_loop();
        let (tx, rx) = std_mpsc::channel();
        let observed = Arc::clone(&event_loop);
        event_loop.spawn(Box::new(move || {
            Box::pin(async move {
                let _ = tx.send(observed.is_loop_thread());
            })
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!event_loop.is_loop_thread());

        event_loop.stop();
        event_loop.post_synthetic_event();
        handle.join().unwrap();
    }

    #[test]
    fn test_pending_tasks_dropped_on_exit() {
        let (event_loop, handle) = start_loop();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        event_loop.spawn(Box::new(move || {
            Box::pin(async move {
                let _held = tx;
                std::future::pending::<()>().await;
            })
        }));
        event_loop.stop();
        event_loop.post_synthetic_event();
        handle.join().unwrap();
        assert!(rx.blocking_recv().is_err());
    }

    #[test]
    fn test_loop_can_run_again_after_stop() {
        let (event_loop, handle) = start_loop();
        event_loop.stop();
        event_loop.post_synthetic_event();
        handle.join().unwrap();

        let (tx, rx) = std_mpsc::channel();
        event_loop.set_delegate(event_loop.make_delegate(Arc::new(SignalReady(tx))));
        let runner = Arc::clone(&event_loop);
        let handle = thread::spawn(move || runner.run().unwrap());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        event_loop.stop();
        event_loop.post_synthetic_event();
        handle.join().unwrap();
    }

    #[test]
    fn test_pinned_loop_rejects_other_threads() {
        let event_loop = Arc::new(HeadlessLoop::pinned_to_current_thread());
        assert!(event_loop.can_run_on_current_thread());
        let other = Arc::clone(&event_loop);
        let result = thread::spawn(move || other.run()).join().unwrap();
        assert_eq!(result.unwrap_err().code, 1);
    }

    /// Records the dispatching thread and stops the loop as soon as it is up.
    struct StopOnLaunch {
        event_loop: Weak<HeadlessLoop>,
        threads: Mutex<Vec<ThreadId>>,
    }

    impl LoopDelegate for StopOnLaunch {
        fn did_finish_launching(&self) {
            self.threads.lock().push(thread::current().id());
            if let Some(event_loop) = self.event_loop.upgrade() {
                event_loop.stop();
                event_loop.post_synthetic_event();
            }
        }
    }

    fn stop_on_launch(event_loop: &Arc<HeadlessLoop>) -> Arc<StopOnLaunch> {
        let delegate = Arc::new(StopOnLaunch {
            event_loop: Arc::downgrade(event_loop),
            threads: Mutex::new(Vec::new()),
        });
        event_loop.set_delegate(event_loop.make_delegate(delegate.clone()));
        delegate
    }

    #[tokio::test]
    async fn test_runs_from_inside_runtime() {
        let event_loop = Arc::new(HeadlessLoop::new());
        assert!(event_loop.can_run_on_current_thread());
        stop_on_launch(&event_loop);

        event_loop.run().unwrap();
        assert!(!event_loop.is_running());
    }

    #[test]
    fn test_dispatch_thread_is_reused() {
        let event_loop = Arc::new(HeadlessLoop::new());
        let delegate = stop_on_launch(&event_loop);

        event_loop.run().unwrap();
        event_loop.run().unwrap();

        let threads = delegate.threads.lock().clone();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0], threads[1]);
        assert_ne!(threads[0], thread::current().id());
    }

    #[test]
    fn test_interpret_line() {
        let config = PickerConfiguration::default();
        assert_eq!(interpret_line("\n", &config), ConsoleOutcome::Cancelled);
        assert_eq!(
            interpret_line("screen:2\n", &config),
            ConsoleOutcome::Selected(ContentSelection::new(SourceKind::Display, "2"))
        );
        assert!(matches!(
            interpret_line("monitor:2", &config),
            ConsoleOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_interpret_line_honours_configuration() {
        let config = PickerConfiguration {
            allowed_picker_modes: PickerMode::SINGLE_WINDOW,
            excluded_window_ids: vec![7],
            ..Default::default()
        };
        assert!(matches!(
            interpret_line("display:1", &config),
            ConsoleOutcome::Failed(_)
        ));
        assert!(matches!(
            interpret_line("window:7", &config),
            ConsoleOutcome::Failed(_)
        ));
        assert_eq!(
            interpret_line("window:8", &config),
            ConsoleOutcome::Selected(ContentSelection::new(SourceKind::Window, "8"))
        );
    }

    struct Recorder(std_mpsc::Sender<String>);

    impl PickerObserver<ContentSelection> for Recorder {
        fn on_selected(&self, filter: ContentSelection) {
            let _ = self.0.send(format!("selected {}", filter));
        }
        fn on_cancelled(&self) {
            let _ = self.0.send("cancelled".to_string());
        }
        fn on_failed(&self, error: PlatformError) {
            let _ = self.0.send(format!("failed {}", error.code));
        }
    }

    #[test]
    fn test_console_picker_reads_one_line_per_presentation() {
        let picker = ConsolePicker::from_reader(std::io::Cursor::new("window:42\n\n"));
        let (tx, rx) = std_mpsc::channel();
        let observer: Arc<dyn PickerObserver<ContentSelection>> = Arc::new(Recorder(tx));
        picker.add_observer(Arc::clone(&observer));

        picker.present();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "selected window:42");
        picker.present();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "cancelled");
        // end of input also cancels
        picker.present();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "cancelled");

        picker.remove_observer(&observer);
        assert_eq!(picker.observer_count(), 0);
    }
}
