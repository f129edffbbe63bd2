//! scbridge: run async work under a thread-owned event loop and turn the
//! platform's content sharing picker into a single awaited result.
//!
//! [`Bridge::run`] starts, reuses or stops the loop around one producer and
//! restores the application's activation policy and delegate afterwards.
//! [`ContentPicker::present`] awaits exactly one of selected / cancelled /
//! failed from the picker.

pub mod facade;
pub mod lease;
pub mod observer;
pub mod platform;
pub mod session;

#[cfg(test)]
mod testing;

pub use facade::Bridge;
pub use observer::ContentPicker;
pub use platform::{
    ConsolePicker, EventLoop, HeadlessLoop, LoopDelegate, LoopTask, ObserverList, PickerObserver,
    PresentationSlot, SharingPicker,
};
pub use scbridge_common::{BridgeError, PlatformError};
pub use session::{LoopSession, SessionOptions};

#[cfg(target_os = "macos")]
pub use platform::{AppKitLoop, SharedFilter, SystemPicker};

/// The event loop this host runs natively.
#[cfg(target_os = "macos")]
pub type PlatformLoop = platform::AppKitLoop;
#[cfg(not(target_os = "macos"))]
pub type PlatformLoop = platform::HeadlessLoop;

/// The picker this host presents natively.
#[cfg(target_os = "macos")]
pub type PlatformPicker = platform::SystemPicker;
#[cfg(not(target_os = "macos"))]
pub type PlatformPicker = platform::ConsolePicker;

/// Short name of the native platform, for diagnostics.
#[cfg(target_os = "macos")]
pub const PLATFORM_NAME: &str = "appkit";
#[cfg(not(target_os = "macos"))]
pub const PLATFORM_NAME: &str = "headless";
