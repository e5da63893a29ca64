use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::{Device, DeviceKey, Direction, KeyboardShortcut};
use crate::config::Config;
use crate::notifications::{NotificationManager, SwitchReason};
use crate::priority::{DeviceRegistry, MoveDirection, RefreshOutcome};
use crate::switching::{
    AutoSwitchEngine, EvaluationOutcome, KeyChord, ShortcutDispatcher, SwitchFailure, SwitchRecord,
};
use crate::system::{AudioSystemInterface, Clock, PersistenceStore};

const EVENT_CAPACITY: usize = 64;

/// Events for the UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeEvent {
    DeviceListChanged,
    ActiveDeviceChanged {
        direction: Direction,
        uid: String,
        name: String,
        manual: bool,
    },
    /// The active device went away and nothing replaced it
    ActiveDeviceCleared {
        direction: Direction,
    },
    ShortcutTriggered {
        title: String,
        subtitle: String,
    },
}

/// Everything a user can ask for from the UI or CLI
#[derive(Debug, Clone, PartialEq)]
pub enum UserIntent {
    SetDefault(DeviceKey),
    Move(DeviceKey, MoveDirection),
    Reorder {
        direction: Direction,
        from: usize,
        to: usize,
    },
    SetPriority(DeviceKey, u32),
    ToggleEnabled(DeviceKey),
    ResetPriorities,
    ClearDisconnected,
    AssignShortcut {
        uid: String,
        shortcut: Option<KeyboardShortcut>,
    },
}

/// Owns the registry and the switching engine and is the single entry
/// point for every change to either. Constructed once per process.
pub struct CascadeController<A: AudioSystemInterface, S: PersistenceStore, C: Clock> {
    registry: DeviceRegistry<S>,
    engine: AutoSwitchEngine<A, C>,
    notifications: NotificationManager,
    events: broadcast::Sender<CascadeEvent>,
    /// Refused switches already notified; the engine retries them every tick
    reported_failures: HashSet<DeviceKey>,
}

impl<A: AudioSystemInterface, S: PersistenceStore, C: Clock> CascadeController<A, S, C> {
    pub fn new(audio_system: A, store: S, clock: C, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: DeviceRegistry::load(store, config.general.new_device_placement),
            engine: AutoSwitchEngine::new(
                audio_system,
                clock,
                config.general.manual_override_cooldown(),
            ),
            notifications: NotificationManager::new(config),
            events,
            reported_failures: HashSet::new(),
        }
    }

    pub fn with_notifications(mut self, notifications: NotificationManager) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CascadeEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &DeviceRegistry<S> {
        &self.registry
    }

    pub fn engine(&self) -> &AutoSwitchEngine<A, C> {
        &self.engine
    }

    pub fn notification_manager(&self) -> &NotificationManager {
        &self.notifications
    }

    /// UID of the active device for a direction
    pub fn current_device(&self, direction: Direction) -> Option<&str> {
        self.engine.current_device(direction)
    }

    /// Registry record of the active device, if it is a known one
    pub fn active_device(&self, direction: Direction) -> Option<&Device> {
        self.current_device(direction)
            .and_then(|uid| self.registry.list(direction).get(uid))
    }

    /// Ask the hardware to report topology changes through `callback`.
    /// The callback runs on a hardware thread and must only hand off work.
    pub fn watch_topology(&self, callback: Box<dyn Fn() + Send + Sync>) -> anyhow::Result<()> {
        self.engine.audio_system().add_device_change_listener(callback)
    }

    /// Read the hardware defaults without switching anything
    pub fn sync_active(&mut self) {
        for direction in Direction::ALL {
            self.engine.sync_active_from_hardware(direction);
        }
    }

    /// Initial merge and selection
    pub fn start(&mut self) -> Option<RefreshOutcome> {
        info!("Starting device cascade");
        let outcome = self.refresh();
        self.evaluate();
        outcome
    }

    /// Merge the current hardware snapshot into the registry. Enumeration
    /// failure leaves the registry untouched and returns `None`.
    pub fn refresh(&mut self) -> Option<RefreshOutcome> {
        let snapshot = match self.engine.audio_system().enumerate_devices() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Device enumeration failed, keeping current state: {:#}", e);
                return None;
            }
        };

        let now = self.engine.clock().now();
        let outcome = self.registry.refresh(&snapshot, now);

        if !outcome.is_empty() {
            self.notify_availability(&outcome);
            self.emit(CascadeEvent::DeviceListChanged);
        }

        Some(outcome)
    }

    pub fn evaluate(&mut self) -> EvaluationOutcome {
        let before = Direction::ALL.map(|d| self.current_device(d).is_some());
        let outcome = self.engine.evaluate(&self.registry);

        for record in &outcome.switches {
            let reason = self.automatic_reason(record);
            self.notifications
                .device_switched(record.direction, &record.name, reason);
            self.emit_switch(record);
        }
        for failure in &outcome.failures {
            self.report_failure(failure);
        }
        // Covers both a gone device and the hardware reporting no default
        for (direction, had_active) in Direction::ALL.into_iter().zip(before) {
            if had_active && self.current_device(direction).is_none() {
                self.emit(CascadeEvent::ActiveDeviceCleared { direction });
            }
        }

        outcome
    }

    /// Manual switch to a known device, starting the override cooldown
    pub fn set_default_device(&mut self, key: &DeviceKey) -> bool {
        let Some(device) = self.registry.find(key).cloned() else {
            debug!("Cannot switch to unknown device {}", key);
            return false;
        };

        match self.engine.set_device(&device, key.direction, true) {
            Some(record) => {
                self.notifications
                    .device_switched(record.direction, &record.name, SwitchReason::Manual);
                self.emit_switch(&record);
                true
            }
            None => false,
        }
    }

    pub fn move_device(&mut self, key: &DeviceKey, movement: MoveDirection) -> bool {
        let changed = self.registry.editor().move_device(key, movement);
        self.after_edit(changed)
    }

    pub fn reorder_device(&mut self, direction: Direction, from: usize, to: usize) -> bool {
        let changed = self.registry.editor().reorder_device(direction, from, to);
        self.after_edit(changed)
    }

    pub fn update_device_priority(&mut self, key: &DeviceKey, priority: u32) -> bool {
        let changed = self.registry.editor().update_device_priority(key, priority);
        self.after_edit(changed)
    }

    /// Flip a device's enabled flag. Disabling the active device drops any
    /// manual override so the next candidate takes over right away.
    pub fn toggle_enabled(&mut self, key: &DeviceKey) -> Option<bool> {
        let was_active = self.current_device(key.direction) == Some(key.uid.as_str());
        let enabled = self.registry.editor().toggle_enabled(key)?;

        if was_active && !enabled {
            info!("Active {} device disabled, re-evaluating", key.direction);
            self.engine.clear_manual_override();
        }

        self.after_edit(true);
        Some(enabled)
    }

    pub fn reset_all_priorities(&mut self) -> bool {
        let changed = self.registry.editor().reset_all_priorities();
        self.after_edit(changed)
    }

    pub fn clear_disconnected_devices(&mut self) -> bool {
        let changed = self.registry.editor().clear_disconnected_devices();
        self.after_edit(changed)
    }

    pub fn assign_shortcut(&mut self, uid: &str, shortcut: Option<KeyboardShortcut>) -> bool {
        let changed = self.registry.editor().assign_shortcut(uid, shortcut);
        if changed {
            self.emit(CascadeEvent::DeviceListChanged);
        }
        changed
    }

    /// Switch to the device bound to `chord`. Returns whether the chord
    /// was consumed.
    pub fn handle_key_chord(&mut self, chord: &KeyChord) -> bool {
        let Some(found) = ShortcutDispatcher::find_match(&self.registry, chord) else {
            return false;
        };

        info!("Shortcut {} selects {}", chord, found.device.name);

        for direction in &found.directions {
            let Some(entry) = self.registry.list(*direction).get(&found.device.uid).cloned() else {
                continue;
            };
            if let Some(record) = self.engine.set_device(&entry, *direction, true) {
                self.emit_switch(&record);
            }
        }

        let (title, subtitle) = (found.title(), found.subtitle());
        self.notifications.shortcut_triggered(&title, &subtitle);
        self.emit(CascadeEvent::ShortcutTriggered { title, subtitle });
        true
    }

    /// Route a user intent to the matching operation. Returns whether
    /// anything changed.
    pub fn apply_intent(&mut self, intent: UserIntent) -> bool {
        debug!("Applying intent: {:?}", intent);
        match intent {
            UserIntent::SetDefault(key) => self.set_default_device(&key),
            UserIntent::Move(key, movement) => self.move_device(&key, movement),
            UserIntent::Reorder { direction, from, to } => self.reorder_device(direction, from, to),
            UserIntent::SetPriority(key, priority) => self.update_device_priority(&key, priority),
            UserIntent::ToggleEnabled(key) => self.toggle_enabled(&key).is_some(),
            UserIntent::ResetPriorities => self.reset_all_priorities(),
            UserIntent::ClearDisconnected => self.clear_disconnected_devices(),
            UserIntent::AssignShortcut { uid, shortcut } => self.assign_shortcut(&uid, shortcut),
        }
    }

    /// Apply a reloaded config and re-read the persisted lists, which other
    /// processes may have edited, then refresh and re-evaluate.
    pub fn reload(&mut self, config: &Config) {
        info!("Reloading controller state");
        self.registry.set_placement(config.general.new_device_placement);
        self.registry.reload();
        self.engine
            .set_cooldown(config.general.manual_override_cooldown());
        self.notifications.apply_config(config);
        self.emit(CascadeEvent::DeviceListChanged);

        self.refresh();
        self.evaluate();
    }

    fn after_edit(&mut self, changed: bool) -> bool {
        if changed {
            self.emit(CascadeEvent::DeviceListChanged);
            self.evaluate();
        }
        changed
    }

    fn automatic_reason(&self, record: &SwitchRecord) -> SwitchReason {
        let previous_available = record
            .previous
            .as_deref()
            .and_then(|uid| self.registry.list(record.direction).get(uid))
            .is_some_and(Device::is_selectable);

        if previous_available {
            SwitchReason::HigherPriority
        } else {
            SwitchReason::PreviousUnavailable
        }
    }

    fn notify_availability(&self, outcome: &RefreshOutcome) {
        // A duplex device shows up once per direction; announce it once
        let mut announced = HashSet::new();
        for key in outcome.discovered.iter().chain(&outcome.reconnected) {
            if announced.insert(key.uid.as_str()) {
                if let Some(device) = self.registry.find(key) {
                    self.notifications.device_connected(device);
                }
            }
        }

        let mut announced = HashSet::new();
        for key in &outcome.disconnected {
            if announced.insert(key.uid.as_str()) {
                if let Some(device) = self.registry.find(key) {
                    self.notifications.device_disconnected(device);
                }
            }
        }
    }

    /// Notify a refused switch once per device until that direction
    /// switches successfully or moves on to another candidate
    fn report_failure(&mut self, failure: &SwitchFailure) {
        let key = DeviceKey::new(failure.direction, failure.uid.clone());
        self.reported_failures
            .retain(|k| k.direction != key.direction || k.uid == key.uid);

        if self.reported_failures.insert(key) {
            self.notifications.switch_failed(&failure.name, &failure.error);
        } else {
            debug!("Switch to {} still refused, already reported", failure.name);
        }
    }

    fn emit_switch(&mut self, record: &SwitchRecord) {
        self.reported_failures
            .retain(|key| key.direction != record.direction);
        self.emit(CascadeEvent::ActiveDeviceChanged {
            direction: record.direction,
            uid: record.uid.clone(),
            name: record.name.clone(),
            manual: record.manual,
        });
    }

    fn emit(&self, event: CascadeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
