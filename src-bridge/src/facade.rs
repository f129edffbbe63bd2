//! Bridge Facade: the entry point request handlers call.

use crate::observer::ContentPicker;
use crate::platform::{EventLoop, SharingPicker};
use crate::session::{LoopHost, LoopSession, SessionOptions};
use scbridge_common::config::BridgeConfig;
use scbridge_common::{BridgeError, LoopStatus, PickerConfiguration};
use std::future::Future;
use std::sync::Arc;

/// Runs async producers under the event loop.
///
/// Cheap to clone; all clones share one loop host, so concurrent calls from
/// any number of threads serialize on loop ownership.
pub struct Bridge<L: EventLoop> {
    host: Arc<LoopHost<L>>,
}

impl<L: EventLoop> Clone for Bridge<L> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
        }
    }
}

impl<L: EventLoop> Bridge<L> {
    pub fn new(event_loop: L) -> Self {
        Self::with_options(event_loop, SessionOptions::default())
    }

    pub fn with_options(event_loop: L, options: SessionOptions) -> Self {
        Self {
            host: Arc::new(LoopHost::new(event_loop, options)),
        }
    }

    pub fn from_config(event_loop: L, config: &BridgeConfig) -> Self {
        Self::with_options(
            event_loop,
            SessionOptions {
                promote_prohibited_policy: config.event_loop.promote_prohibited_policy,
            },
        )
    }

    pub fn event_loop(&self) -> &L {
        &self.host.event_loop
    }

    /// Run `producer` on the loop thread, starting the loop if needed, and
    /// return its result. Blocks the calling thread.
    ///
    /// The producer's own error type passes through unchanged; bridge
    /// failures are converted with `From<BridgeError>`.
    pub fn run<T, E, F, Fut>(&self, producer: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<BridgeError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        LoopSession::new(Arc::clone(&self.host)).run(producer)
    }

    /// Present `picker` under the loop and return the selected filter.
    pub fn pick<P: SharingPicker>(
        &self,
        picker: &ContentPicker<P>,
        config: PickerConfiguration,
    ) -> Result<P::Filter, BridgeError> {
        let picker = picker.clone();
        self.run(move || async move { picker.present(&config).await })
    }

    pub fn status(&self) -> LoopStatus {
        let (phase, guests) = self.host.lease.snapshot();
        LoopStatus {
            loop_running: self.host.event_loop.is_running(),
            phase,
            guests,
            activation_policy: self.host.event_loop.activation_policy(),
        }
    }
}
