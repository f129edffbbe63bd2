//! Scripted picker for unit tests.

use crate::platform::{ObserverList, PickerObserver, PresentationSlot, SharingPicker};
use parking_lot::Mutex;
use scbridge_common::{ContentSelection, PickerConfiguration, PlatformError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

type Observer = Arc<dyn PickerObserver<ContentSelection>>;

/// What the picker does when presented.
#[derive(Debug, Clone)]
pub enum Script {
    Select(ContentSelection),
    Cancel,
    Fail(PlatformError),
    /// Misbehaving platform: two terminal callbacks for one presentation.
    SelectThenCancel(ContentSelection),
    /// Keep the presentation open until `release_held`.
    Hold,
}

pub struct ScriptedPicker {
    script: Mutex<Script>,
    observers: ObserverList<ContentSelection>,
    slot: PresentationSlot,
    held: Mutex<Vec<Observer>>,
    config: Mutex<Option<PickerConfiguration>>,
    added: AtomicUsize,
    removed: AtomicUsize,
    presented: Notify,
}

impl ScriptedPicker {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            observers: ObserverList::new(),
            slot: PresentationSlot::new(),
            held: Mutex::new(Vec::new()),
            config: Mutex::new(None),
            added: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
            presented: Notify::new(),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn last_configuration(&self) -> Option<PickerConfiguration> {
        self.config.lock().clone()
    }

    /// Wait until a held presentation is showing.
    pub async fn wait_presented(&self) {
        self.presented.notified().await;
    }

    /// Finish a held presentation with `script`.
    pub fn release_held(&self, script: Script) {
        let held = std::mem::take(&mut *self.held.lock());
        deliver(&held, &script);
    }
}

fn deliver(observers: &[Observer], script: &Script) {
    for observer in observers {
        match script {
            Script::Select(selection) => observer.on_selected(selection.clone()),
            Script::Cancel => observer.on_cancelled(),
            Script::Fail(error) => observer.on_failed(error.clone()),
            Script::SelectThenCancel(selection) => {
                observer.on_selected(selection.clone());
                observer.on_cancelled();
            }
            Script::Hold => {}
        }
    }
}

impl SharingPicker for ScriptedPicker {
    type Filter = ContentSelection;

    fn presentation_slot(&self) -> &PresentationSlot {
        &self.slot
    }

    fn add_observer(&self, observer: Observer) {
        self.added.fetch_add(1, Ordering::SeqCst);
        self.observers.add(observer, ());
    }

    fn remove_observer(&self, observer: &Observer) {
        if self.observers.remove(observer).is_some() {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn set_configuration(&self, config: &PickerConfiguration) {
        *self.config.lock() = Some(config.clone());
    }

    fn present(&self) {
        let observers = self.observers.snapshot();
        let script = self.script.lock().clone();
        if let Script::Hold = script {
            self.held.lock().extend(observers);
            self.presented.notify_one();
            return;
        }
        deliver(&observers, &script);
    }
}
