//! macOS platform: `NSApplication` as the event loop, `SCContentSharingPicker`
//! as the picker.
//!
//! AppKit objects are only touched on the main thread. Work arriving from
//! other threads hops over with `dispatch::Queue::main()`, and the futures the
//! bridge schedules are polled by a small executor that lives on the main
//! queue.

use super::{
    EventLoop, LoopDelegate, LoopTask, ObserverList, PickerObserver, PresentationSlot,
    SharingPicker,
};
use dispatch::Queue;
use futures_util::future::LocalBoxFuture;
use futures_util::task::{waker_ref, ArcWake};
use objc2::rc::Retained;
use objc2::runtime::{NSObject, NSObjectProtocol, ProtocolObject};
use objc2::{
    define_class, msg_send, AllocAnyThread, DefinedClass, MainThreadMarker, MainThreadOnly,
    Message,
};
use objc2_app_kit::{
    NSApplication, NSApplicationActivationPolicy, NSApplicationDelegate, NSEvent,
    NSEventModifierFlags, NSEventType, NSRunningApplication,
};
use objc2_foundation::{NSArray, NSError, NSNotification, NSNumber, NSPoint, NSString};
use objc2_screen_capture_kit::{
    SCContentFilter, SCContentSharingPicker, SCContentSharingPickerConfiguration,
    SCContentSharingPickerMode, SCContentSharingPickerObserver, SCShareableContentStyle, SCStream,
};
use parking_lot::Mutex;
use scbridge_common::{ActivationPolicy, PickerConfiguration, PlatformError};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Context;
use tracing::{debug, warn};

const APPKIT_ERROR_DOMAIN: &str = "scbridge.appkit";

/// A value that is only created, used and dropped on the main thread.
#[derive(Clone)]
struct MainOnly<T>(T);

// Every access goes through the main thread (directly or via the main queue).
unsafe impl<T> Send for MainOnly<T> {}
unsafe impl<T> Sync for MainOnly<T> {}

impl<T> MainOnly<T> {
    fn get(&self) -> &T {
        &self.0
    }
}

/// Run `f` on the main thread: inline when already there, otherwise queued.
fn on_main(f: impl FnOnce(MainThreadMarker) + Send + 'static) {
    if let Some(mtm) = MainThreadMarker::new() {
        f(mtm);
        return;
    }
    Queue::main().exec_async(move || match MainThreadMarker::new() {
        Some(mtm) => f(mtm),
        None => warn!("Main queue block ran off the main thread"),
    });
}

fn to_native(policy: ActivationPolicy) -> NSApplicationActivationPolicy {
    match policy {
        ActivationPolicy::Regular => NSApplicationActivationPolicy::Regular,
        ActivationPolicy::Accessory => NSApplicationActivationPolicy::Accessory,
        ActivationPolicy::Prohibited => NSApplicationActivationPolicy::Prohibited,
    }
}

fn from_native(policy: NSApplicationActivationPolicy) -> ActivationPolicy {
    if policy == NSApplicationActivationPolicy::Regular {
        ActivationPolicy::Regular
    } else if policy == NSApplicationActivationPolicy::Accessory {
        ActivationPolicy::Accessory
    } else {
        ActivationPolicy::Prohibited
    }
}

fn platform_error(error: &NSError) -> PlatformError {
    PlatformError::new(
        error.domain().to_string(),
        error.code() as i64,
        error.localizedDescription().to_string(),
    )
}

struct AppDelegateIvars {
    delegate: Arc<dyn LoopDelegate>,
}

define_class!(
    // SAFETY: NSObject has no subclassing requirements and the class has no Drop impl.
    #[unsafe(super(NSObject))]
    #[thread_kind = MainThreadOnly]
    #[name = "SCBridgeAppDelegate"]
    #[ivars = AppDelegateIvars]
    struct BridgeAppDelegate;

    unsafe impl NSObjectProtocol for BridgeAppDelegate {}

    unsafe impl NSApplicationDelegate for BridgeAppDelegate {
        #[unsafe(method(applicationDidFinishLaunching:))]
        fn application_did_finish_launching(&self, _notification: &NSNotification) {
            self.ivars().delegate.did_finish_launching();
        }
    }
);

impl BridgeAppDelegate {
    fn new(mtm: MainThreadMarker, delegate: Arc<dyn LoopDelegate>) -> Retained<Self> {
        let this = Self::alloc(mtm).set_ivars(AppDelegateIvars { delegate });
        unsafe { msg_send![super(this), init] }
    }
}

/// Application delegate as saved and restored around a session.
#[derive(Clone, Default)]
pub struct AppDelegateHandle {
    object: Option<MainOnly<Retained<ProtocolObject<dyn NSApplicationDelegate>>>>,
    bridge: Option<Arc<dyn LoopDelegate>>,
}

/// Future polled on the main queue.
struct MainTask {
    future: Mutex<Option<LocalBoxFuture<'static, ()>>>,
}

// The future is created and polled only on the main queue.
unsafe impl Send for MainTask {}
unsafe impl Sync for MainTask {}

impl MainTask {
    fn start(future: LocalBoxFuture<'static, ()>) {
        let task = Arc::new(MainTask {
            future: Mutex::new(Some(future)),
        });
        Self::poll(&task);
    }

    fn poll(task: &Arc<Self>) {
        let mut slot = task.future.lock();
        if let Some(future) = slot.as_mut() {
            let waker = waker_ref(task);
            let mut cx = Context::from_waker(&waker);
            if future.as_mut().poll(&mut cx).is_ready() {
                *slot = None;
            }
        }
    }
}

impl ArcWake for MainTask {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let task = Arc::clone(arc_self);
        Queue::main().exec_async(move || MainTask::poll(&task));
    }
}

/// `NSApplication`'s run loop on the main thread.
pub struct AppKitLoop {
    /// Set while `run` is blocked in `-[NSApplication run]`.
    running: AtomicBool,
    /// Bridge delegate last installed, re-signalled on later runs.
    installed: Mutex<Option<Arc<dyn LoopDelegate>>>,
}

impl AppKitLoop {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            installed: Mutex::new(None),
        }
    }
}

impl Default for AppKitLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for AppKitLoop {
    type DelegateHandle = AppDelegateHandle;

    fn is_running(&self) -> bool {
        if self.running.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(mtm) = MainThreadMarker::new() {
            return NSApplication::sharedApplication(mtm).isRunning();
        }
        if !NSRunningApplication::currentApplication().isFinishedLaunching() {
            return false;
        }
        // NSApp exists once launching finished; isRunning only reads a flag.
        let mtm = unsafe { MainThreadMarker::new_unchecked() };
        NSApplication::sharedApplication(mtm).isRunning()
    }

    fn is_loop_thread(&self) -> bool {
        MainThreadMarker::new().is_some() && self.is_running()
    }

    fn can_run_on_current_thread(&self) -> bool {
        MainThreadMarker::new().is_some()
    }

    fn run(&self) -> Result<(), PlatformError> {
        let mtm = MainThreadMarker::new().ok_or_else(|| {
            PlatformError::new(APPKIT_ERROR_DOMAIN, 1, "NSApplication must run on the main thread")
        })?;
        let app = NSApplication::sharedApplication(mtm);

        // applicationDidFinishLaunching fires once per process; later runs re-signal.
        if NSRunningApplication::currentApplication().isFinishedLaunching() {
            if let Some(delegate) = self.installed.lock().clone() {
                debug!("Application already launched; re-signalling delegate");
                Queue::main().exec_async(move || delegate.did_finish_launching());
            }
        }

        self.running.store(true, Ordering::SeqCst);
        unsafe { app.run() };
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        on_main(|mtm| NSApplication::sharedApplication(mtm).stop(None));
    }

    fn post_synthetic_event(&self) {
        on_main(|mtm| {
            let event = unsafe { NSEvent::otherEventWithType_location_modifierFlags_timestamp_windowNumber_context_subtype_data1_data2(
                NSEventType::ApplicationDefined,
                NSPoint::new(0.0, 0.0),
                NSEventModifierFlags(0),
                0.0,
                0,
                None,
                0,
                0,
                0,
            ) };
            match event {
                Some(event) => unsafe {
                    NSApplication::sharedApplication(mtm).postEvent_atStart(&event, true)
                },
                None => warn!("Failed to create wake-up event"),
            }
        });
    }

    fn activation_policy(&self) -> ActivationPolicy {
        from_native(NSRunningApplication::currentApplication().activationPolicy())
    }

    fn set_activation_policy(&self, policy: ActivationPolicy) {
        on_main(move |mtm| {
            if !NSApplication::sharedApplication(mtm).setActivationPolicy(to_native(policy)) {
                warn!(%policy, "NSApplication refused activation policy");
            }
        });
    }

    fn delegate(&self) -> Self::DelegateHandle {
        let Some(mtm) = MainThreadMarker::new() else {
            warn!("Application delegate read off the main thread");
            return AppDelegateHandle::default();
        };
        AppDelegateHandle {
            object: NSApplication::sharedApplication(mtm).delegate().map(MainOnly),
            bridge: self.installed.lock().clone(),
        }
    }

    fn set_delegate(&self, delegate: Self::DelegateHandle) {
        let Some(mtm) = MainThreadMarker::new() else {
            warn!("Application delegate written off the main thread; ignored");
            return;
        };
        let object = delegate.object.as_ref().map(|o| &**o.get());
        unsafe { NSApplication::sharedApplication(mtm).setDelegate(object) };
        *self.installed.lock() = delegate.bridge;
    }

    fn make_delegate(&self, delegate: Arc<dyn LoopDelegate>) -> Self::DelegateHandle {
        let Some(mtm) = MainThreadMarker::new() else {
            warn!("Application delegate created off the main thread");
            return AppDelegateHandle::default();
        };
        let object = BridgeAppDelegate::new(mtm, Arc::clone(&delegate));
        AppDelegateHandle {
            object: Some(MainOnly(ProtocolObject::from_retained(object))),
            bridge: Some(delegate),
        }
    }

    fn spawn(&self, task: LoopTask) {
        Queue::main().exec_async(move || MainTask::start(task()));
    }
}

/// Content filter chosen in the system picker.
#[derive(Clone)]
pub struct SharedFilter(Retained<SCContentFilter>);

// The picker hands over filters that are never mutated afterwards.
unsafe impl Send for SharedFilter {}
unsafe impl Sync for SharedFilter {}

impl SharedFilter {
    pub fn as_filter(&self) -> &SCContentFilter {
        &self.0
    }

    pub fn style_name(&self) -> &'static str {
        let style = unsafe { self.0.style() };
        if style == SCShareableContentStyle::Display {
            "display"
        } else if style == SCShareableContentStyle::Window {
            "window"
        } else if style == SCShareableContentStyle::Application {
            "application"
        } else {
            "none"
        }
    }
}

impl fmt::Display for SharedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} content filter", self.style_name())
    }
}

impl fmt::Debug for SharedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedFilter").field(&self.style_name()).finish()
    }
}

struct PickerObserverIvars {
    observer: Arc<dyn PickerObserver<SharedFilter>>,
}

define_class!(
    // SAFETY: NSObject has no subclassing requirements and the class has no Drop impl.
    #[unsafe(super(NSObject))]
    #[name = "SCBridgePickerObserver"]
    #[ivars = PickerObserverIvars]
    struct PickerObserverObject;

    unsafe impl NSObjectProtocol for PickerObserverObject {}

    unsafe impl SCContentSharingPickerObserver for PickerObserverObject {
        #[unsafe(method(contentSharingPicker:didCancelForStream:))]
        fn did_cancel(&self, _picker: &SCContentSharingPicker, _stream: Option<&SCStream>) {
            self.ivars().observer.on_cancelled();
        }

        #[unsafe(method(contentSharingPicker:didUpdateWithFilter:forStream:))]
        fn did_update(
            &self,
            _picker: &SCContentSharingPicker,
            filter: &SCContentFilter,
            _stream: Option<&SCStream>,
        ) {
            self.ivars().observer.on_selected(SharedFilter(filter.retain()));
        }

        #[unsafe(method(contentSharingPickerStartDidFailWithError:))]
        fn did_fail(&self, error: &NSError) {
            self.ivars().observer.on_failed(platform_error(error));
        }
    }
);

impl PickerObserverObject {
    fn new(observer: Arc<dyn PickerObserver<SharedFilter>>) -> Retained<Self> {
        let this = Self::alloc().set_ivars(PickerObserverIvars { observer });
        unsafe { msg_send![super(this), init] }
    }
}

/// Shared by every `SystemPicker`, since they all drive `sharedPicker`.
static SHARED_PICKER_SLOT: PresentationSlot = PresentationSlot::new();

/// The process-wide `SCContentSharingPicker` (macOS 14+).
pub struct SystemPicker {
    registered: ObserverList<SharedFilter, MainOnly<Retained<PickerObserverObject>>>,
}

impl SystemPicker {
    pub fn new() -> Self {
        Self {
            registered: ObserverList::new(),
        }
    }

    fn shared() -> Retained<SCContentSharingPicker> {
        unsafe { SCContentSharingPicker::sharedPicker() }
    }
}

impl Default for SystemPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl SharingPicker for SystemPicker {
    type Filter = SharedFilter;

    fn presentation_slot(&self) -> &PresentationSlot {
        &SHARED_PICKER_SLOT
    }

    fn add_observer(&self, observer: Arc<dyn PickerObserver<SharedFilter>>) {
        let object = PickerObserverObject::new(Arc::clone(&observer));
        unsafe { Self::shared().addObserver(ProtocolObject::from_ref(&*object)) };
        self.registered.add(observer, MainOnly(object));
    }

    fn remove_observer(&self, observer: &Arc<dyn PickerObserver<SharedFilter>>) {
        let Some((object, emptied)) = self.registered.remove(observer) else {
            return;
        };
        let picker = Self::shared();
        unsafe { picker.removeObserver(ProtocolObject::from_ref(&**object.get())) };
        if emptied {
            unsafe { picker.setActive(false) };
            debug!("Content sharing picker deactivated");
        }
    }

    fn set_configuration(&self, config: &PickerConfiguration) {
        let native = unsafe { SCContentSharingPickerConfiguration::new() };
        unsafe {
            if !config.allowed_picker_modes.is_empty() {
                native.setAllowedPickerModes(SCContentSharingPickerMode(
                    config.allowed_picker_modes.bits() as usize,
                ));
            }
            let window_ids: Vec<Retained<NSNumber>> = config
                .excluded_window_ids
                .iter()
                .map(|id| NSNumber::new_u32(*id))
                .collect();
            native.setExcludedWindowIDs(&NSArray::from_retained_slice(&window_ids));
            let bundle_ids: Vec<Retained<NSString>> = config
                .excluded_bundle_ids
                .iter()
                .map(|id| NSString::from_str(id))
                .collect();
            native.setExcludedBundleIDs(&NSArray::from_retained_slice(&bundle_ids));
            native.setAllowsChangingSelectedContent(config.allows_changing_selected_content);
            Self::shared().setDefaultConfiguration(Some(&native));
        }
    }

    fn present(&self) {
        let picker = Self::shared();
        unsafe {
            picker.setActive(true);
            picker.present();
        }
    }
}
