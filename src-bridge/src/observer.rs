//! Observer Bridge: one picker presentation as one awaited result.
//!
//! The picker reports through three mutually exclusive callbacks. A
//! registration is added as the picker's observer for exactly one
//! presentation; the first terminal callback unregisters it and resolves the
//! pending result, any later callback is logged and dropped.

use crate::platform::{PickerObserver, SharingPicker};
use parking_lot::Mutex;
use scbridge_common::{BridgeError, PickerConfiguration, PlatformError};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error};

type Outcome<F> = Result<F, BridgeError>;

/// Observer registered for a single presentation.
struct Registration<P: SharingPicker> {
    pending: Mutex<Option<oneshot::Sender<Outcome<P::Filter>>>>,
    picker: Mutex<Option<Arc<P>>>,
    this: Weak<Registration<P>>,
    config: PickerConfiguration,
}

impl<P: SharingPicker> Registration<P> {
    fn new(
        picker: Arc<P>,
        config: PickerConfiguration,
        pending: oneshot::Sender<Outcome<P::Filter>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            pending: Mutex::new(Some(pending)),
            picker: Mutex::new(Some(picker)),
            this: this.clone(),
            config,
        })
    }

    fn as_observer(self: &Arc<Self>) -> Arc<dyn PickerObserver<P::Filter>> {
        Arc::clone(self) as Arc<dyn PickerObserver<P::Filter>>
    }

    /// Register, configure, present.
    fn present(self: &Arc<Self>) {
        let picker = self.picker.lock().clone();
        if let Some(picker) = picker {
            picker.add_observer(self.as_observer());
            picker.set_configuration(&self.config);
            picker.present();
        }
    }

    /// Remove this observer from the picker. Only the first call has an effect.
    fn unregister(&self) {
        let picker = self.picker.lock().take();
        let (Some(picker), Some(this)) = (picker, self.this.upgrade()) else {
            return;
        };
        picker.remove_observer(&this.as_observer());
        debug!("Picker observer removed");
    }

    fn resolve(&self, outcome: Outcome<P::Filter>, callback: &str) {
        let pending = self.pending.lock().take();
        let Some(pending) = pending else {
            error!(callback, "Picker delivered a second terminal callback; ignoring");
            return;
        };
        self.unregister();
        if pending.send(outcome).is_err() {
            debug!(callback, "Picker result arrived after the caller stopped waiting");
        }
    }
}

impl<P: SharingPicker> PickerObserver<P::Filter> for Registration<P> {
    fn on_selected(&self, filter: P::Filter) {
        self.resolve(Ok(filter), "selected");
    }

    fn on_cancelled(&self) {
        self.resolve(Err(BridgeError::Cancelled), "cancelled");
    }

    fn on_failed(&self, error: PlatformError) {
        self.resolve(Err(BridgeError::PlatformFailure(error)), "failed");
    }
}

/// Unregisters when the awaiting caller goes away first.
struct UnregisterOnDrop<P: SharingPicker>(Arc<Registration<P>>);

impl<P: SharingPicker> Drop for UnregisterOnDrop<P> {
    fn drop(&mut self) {
        self.0.unregister();
    }
}

/// Frees the picker's presentation slot when a presentation ends.
struct SlotGuard<P: SharingPicker>(Arc<P>);

impl<P: SharingPicker> Drop for SlotGuard<P> {
    fn drop(&mut self) {
        self.0.presentation_slot().release();
    }
}

/// Async front end for a content sharing picker.
///
/// Any number of `ContentPicker`s may wrap the same picker; they share its
/// presentation slot.
pub struct ContentPicker<P: SharingPicker> {
    picker: Arc<P>,
}

impl<P: SharingPicker> Clone for ContentPicker<P> {
    fn clone(&self) -> Self {
        Self {
            picker: Arc::clone(&self.picker),
        }
    }
}

impl<P: SharingPicker> ContentPicker<P> {
    pub fn new(picker: P) -> Self {
        Self::from_shared(Arc::new(picker))
    }

    pub fn from_shared(picker: Arc<P>) -> Self {
        Self { picker }
    }

    pub fn picker(&self) -> &Arc<P> {
        &self.picker
    }

    /// Present the picker and wait for the user's choice.
    ///
    /// Resolves with the selected filter, `Cancelled` when the user backs out,
    /// or the platform's error. Fails with `PickerBusy`, without touching the
    /// picker, while another presentation on the same picker is outstanding.
    pub async fn present(&self, config: &PickerConfiguration) -> Result<P::Filter, BridgeError> {
        if !self.picker.presentation_slot().try_claim() {
            return Err(BridgeError::PickerBusy);
        }
        // Dropped after the unregister guard below
        let _slot = SlotGuard(Arc::clone(&self.picker));

        let (tx, rx) = oneshot::channel();
        let registration = Registration::new(Arc::clone(&self.picker), config.clone(), tx);
        let _unregister = UnregisterOnDrop(Arc::clone(&registration));

        debug!(modes = %config.allowed_picker_modes, "Presenting content picker");
        registration.present();

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::MissingResult),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Script, ScriptedPicker};
    use scbridge_common::{ContentSelection, PickerMode, SourceKind};

    fn display(id: &str) -> ContentSelection {
        ContentSelection::new(SourceKind::Display, id)
    }

    #[tokio::test]
    async fn test_selected_resolves_once_and_unregisters() {
        let picker = Arc::new(ScriptedPicker::new(Script::Select(display("1"))));
        let content = ContentPicker::from_shared(Arc::clone(&picker));

        let config = PickerConfiguration {
            allowed_picker_modes: PickerMode::SINGLE_DISPLAY,
            ..Default::default()
        };
        let selected = content.present(&config).await.unwrap();

        assert_eq!(selected, display("1"));
        assert_eq!(picker.added(), 1);
        assert_eq!(picker.removed(), 1);
        assert_eq!(picker.observer_count(), 0);
        assert_eq!(picker.last_configuration(), Some(config));
    }

    #[tokio::test]
    async fn test_cancel_is_cancelled_error() {
        let picker = Arc::new(ScriptedPicker::new(Script::Cancel));
        let content = ContentPicker::from_shared(Arc::clone(&picker));

        let err = content
            .present(&PickerConfiguration::default())
            .await
            .unwrap_err();

        assert_eq!(err, BridgeError::Cancelled);
        assert_eq!(picker.removed(), 1);
    }

    #[tokio::test]
    async fn test_failure_forwards_platform_error() {
        let underlying = PlatformError::new("SCStreamErrorDomain", -3801, "declined");
        let picker = Arc::new(ScriptedPicker::new(Script::Fail(underlying.clone())));
        let content = ContentPicker::from_shared(Arc::clone(&picker));

        let err = content
            .present(&PickerConfiguration::default())
            .await
            .unwrap_err();

        assert_eq!(err, BridgeError::PlatformFailure(underlying));
        assert_eq!(picker.removed(), 1);
    }

    #[tokio::test]
    async fn test_second_terminal_callback_is_ignored() {
        let picker = Arc::new(ScriptedPicker::new(Script::SelectThenCancel(display("2"))));
        let content = ContentPicker::from_shared(Arc::clone(&picker));

        let selected = content
            .present(&PickerConfiguration::default())
            .await
            .unwrap();

        assert_eq!(selected, display("2"));
        assert_eq!(picker.removed(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_present_is_busy() {
        let picker = Arc::new(ScriptedPicker::new(Script::Hold));
        let content = ContentPicker::from_shared(Arc::clone(&picker));

        let first = {
            let content = content.clone();
            tokio::spawn(async move { content.present(&PickerConfiguration::default()).await })
        };
        picker.wait_presented().await;

        let err = content
            .present(&PickerConfiguration::default())
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::PickerBusy);
        assert_eq!(picker.added(), 1);

        picker.release_held(Script::Select(display("4")));
        assert_eq!(first.await.unwrap().unwrap(), display("4"));

        // Slot freed once the first presentation resolved
        picker.set_script(Script::Cancel);
        assert_eq!(
            content.present(&PickerConfiguration::default()).await,
            Err(BridgeError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_pickers_sharing_a_singleton_present_one_at_a_time() {
        let picker = Arc::new(ScriptedPicker::new(Script::Hold));
        let first = ContentPicker::from_shared(Arc::clone(&picker));
        let second = ContentPicker::from_shared(Arc::clone(&picker));

        let pending = {
            let first = first.clone();
            tokio::spawn(async move { first.present(&PickerConfiguration::default()).await })
        };
        picker.wait_presented().await;

        assert_eq!(
            second.present(&PickerConfiguration::default()).await,
            Err(BridgeError::PickerBusy)
        );
        assert_eq!(picker.added(), 1);
        assert_eq!(picker.observer_count(), 1);

        // One selection resolves exactly one caller
        picker.release_held(Script::Select(display("1")));
        assert_eq!(pending.await.unwrap(), Ok(display("1")));
        assert!(!picker.presentation_slot().is_claimed());

        picker.set_script(Script::Select(display("3")));
        assert_eq!(
            second.present(&PickerConfiguration::default()).await,
            Ok(display("3"))
        );
        assert_eq!(picker.added(), 2);
        assert_eq!(picker.removed(), 2);
    }

    #[tokio::test]
    async fn test_dropped_future_unregisters() {
        let picker = Arc::new(ScriptedPicker::new(Script::Hold));
        let content = ContentPicker::from_shared(Arc::clone(&picker));

        let waiting = {
            let content = content.clone();
            tokio::spawn(async move { content.present(&PickerConfiguration::default()).await })
        };
        picker.wait_presented().await;
        waiting.abort();
        let _ = waiting.await;

        assert_eq!(picker.observer_count(), 0);
        assert_eq!(picker.removed(), 1);
        assert!(!picker.presentation_slot().is_claimed());

        // A late callback after the caller left goes nowhere
        picker.release_held(Script::Cancel);
        assert_eq!(picker.removed(), 1);
    }
}
