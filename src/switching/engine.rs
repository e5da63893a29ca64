use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::audio::{Device, Direction};
use crate::priority::DeviceRegistry;
use crate::system::{AudioSystemInterface, Clock, PersistenceStore};

/// Per-direction view of the switching state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    NoActive,
    ActiveAndStable,
    ManualOverrideActive,
}

/// A successful change of the hardware default.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchRecord {
    pub direction: Direction,
    pub uid: String,
    pub name: String,
    pub previous: Option<String>,
    pub manual: bool,
}

/// A switch the hardware refused; retried on the next evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchFailure {
    pub direction: Direction,
    pub uid: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    pub switches: Vec<SwitchRecord>,
    pub failures: Vec<SwitchFailure>,
    /// Directions whose active device went away with nothing to replace it
    pub cleared: Vec<Direction>,
    pub suppressed: bool,
}

impl EvaluationOutcome {
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty() && self.failures.is_empty() && self.cleared.is_empty()
    }
}

/// Decides which device should be the system default for each direction
/// and is the only component that changes it.
pub struct AutoSwitchEngine<A: AudioSystemInterface, C: Clock> {
    audio_system: A,
    clock: C,
    cooldown: Duration,
    current_input: Option<String>,
    current_output: Option<String>,
    last_manual_switch: Option<DateTime<Utc>>,
}

impl<A: AudioSystemInterface, C: Clock> AutoSwitchEngine<A, C> {
    pub fn new(audio_system: A, clock: C, cooldown: std::time::Duration) -> Self {
        Self {
            audio_system,
            clock,
            cooldown: to_chrono(cooldown),
            current_input: None,
            current_output: None,
            last_manual_switch: None,
        }
    }

    pub fn audio_system(&self) -> &A {
        &self.audio_system
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn set_cooldown(&mut self, cooldown: std::time::Duration) {
        self.cooldown = to_chrono(cooldown);
    }

    pub fn current_device(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Input => self.current_input.as_deref(),
            Direction::Output => self.current_output.as_deref(),
        }
    }

    fn current_slot(&mut self, direction: Direction) -> &mut Option<String> {
        match direction {
            Direction::Input => &mut self.current_input,
            Direction::Output => &mut self.current_output,
        }
    }

    pub fn last_manual_switch(&self) -> Option<DateTime<Utc>> {
        self.last_manual_switch
    }

    /// True while a manual switch is younger than the cooldown.
    pub fn in_cooldown(&self) -> bool {
        self.last_manual_switch
            .is_some_and(|at| self.clock.now() - at < self.cooldown)
    }

    pub fn clear_manual_override(&mut self) {
        if self.last_manual_switch.take().is_some() {
            debug!("Manual override cleared");
        }
    }

    pub fn state(&self, direction: Direction) -> SwitchState {
        match self.current_device(direction) {
            None => SwitchState::NoActive,
            Some(_) if self.in_cooldown() => SwitchState::ManualOverrideActive,
            Some(_) => SwitchState::ActiveAndStable,
        }
    }

    /// Pick up the hardware default, which may have been changed outside
    /// this process. A failed query keeps what we had.
    pub fn sync_active_from_hardware(&mut self, direction: Direction) {
        match self.audio_system.get_default_device(direction) {
            Ok(uid) => {
                let slot = self.current_slot(direction);
                if *slot != uid {
                    debug!("{} default is now {:?} (was {:?})", direction, uid, slot);
                    *slot = uid;
                }
            }
            Err(e) => {
                debug!("Could not query {} default, keeping cached: {:#}", direction, e);
            }
        }
    }

    /// Move each direction to its best available device unless a manual
    /// switch is still inside the cooldown window.
    pub fn evaluate<S: PersistenceStore>(
        &mut self,
        registry: &DeviceRegistry<S>,
    ) -> EvaluationOutcome {
        let mut outcome = EvaluationOutcome::default();

        for direction in Direction::ALL {
            self.sync_active_from_hardware(direction);
        }

        if self.in_cooldown() {
            debug!("Manual override active, skipping evaluation");
            outcome.suppressed = true;
            return outcome;
        }

        for direction in Direction::ALL {
            let list = registry.list(direction);
            let Some(candidate) = list.best_candidate() else {
                // Never unset a working device, but forget one that is gone
                let gone = self
                    .current_device(direction)
                    .and_then(|uid| list.get(uid))
                    .is_some_and(|d| !d.is_currently_connected);
                if gone {
                    debug!("Active {} device disconnected with no alternative", direction);
                    *self.current_slot(direction) = None;
                    outcome.cleared.push(direction);
                }
                continue;
            };

            if self.current_device(direction) == Some(candidate.uid.as_str()) {
                continue;
            }

            match self.switch(candidate, direction, false) {
                Ok(record) => outcome.switches.push(record),
                Err(failure) => outcome.failures.push(failure),
            }
        }

        outcome
    }

    /// Make `device` the default for `direction`. Returns `None` without
    /// touching hardware when the device is disabled, disconnected or lacks
    /// the direction. A manual switch starts the cooldown.
    pub fn set_device(
        &mut self,
        device: &Device,
        direction: Direction,
        manual: bool,
    ) -> Option<SwitchRecord> {
        if !device.is_selectable() || !device.supports(direction) {
            debug!("Not switching {} to unavailable device {}", direction, device.name);
            return None;
        }

        self.switch(device, direction, manual).ok()
    }

    fn switch(
        &mut self,
        device: &Device,
        direction: Direction,
        manual: bool,
    ) -> Result<SwitchRecord, SwitchFailure> {
        info!("Switching {} to {} ({})", direction, device.name, device.uid);

        if let Err(e) = self.audio_system.set_default_device(direction, &device.uid) {
            warn!("Failed to switch {} to {}: {:#}", direction, device.name, e);
            return Err(SwitchFailure {
                direction,
                uid: device.uid.clone(),
                name: device.name.clone(),
                error: format!("{:#}", e),
            });
        }

        let previous = self.current_slot(direction).replace(device.uid.clone());
        if manual {
            self.last_manual_switch = Some(self.clock.now());
        }

        Ok(SwitchRecord {
            direction,
            uid: device.uid.clone(),
            name: device.name.clone(),
            previous,
            manual,
        })
    }
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{DeviceKey, DeviceSnapshot};
    use crate::config::NewDevicePlacement;
    use crate::system::{MemoryStore, MockAudioSystem, MockClock};

    const COOLDOWN: std::time::Duration = std::time::Duration::from_secs(3);

    struct Fixture {
        audio: MockAudioSystem,
        clock: MockClock,
        registry: DeviceRegistry<MemoryStore>,
        engine: AutoSwitchEngine<MockAudioSystem, MockClock>,
    }

    impl Fixture {
        fn new(devices: &[DeviceSnapshot]) -> Self {
            let audio = MockAudioSystem::new();
            for device in devices {
                audio.add_device(device.clone());
            }
            let clock = MockClock::new();
            let mut registry = DeviceRegistry::load(MemoryStore::new(), NewDevicePlacement::Bottom);
            registry.refresh(devices, clock.now());
            let engine = AutoSwitchEngine::new(audio.clone(), clock.clone(), COOLDOWN);
            Self {
                audio,
                clock,
                registry,
                engine,
            }
        }

        fn evaluate(&mut self) -> EvaluationOutcome {
            self.engine.evaluate(&self.registry)
        }

        fn output(&self, uid: &str) -> Device {
            self.registry
                .find(&DeviceKey::new(Direction::Output, uid))
                .cloned()
                .unwrap()
        }
    }

    fn speaker(uid: &str) -> DeviceSnapshot {
        DeviceSnapshot::new(uid, format!("Speaker {uid}"), false, true)
    }

    #[test]
    fn test_evaluate_selects_highest_priority() {
        let mut f = Fixture::new(&[speaker("a"), speaker("b")]);
        f.audio.set_mock_default(Direction::Output, Some("b"));

        let outcome = f.evaluate();

        assert_eq!(outcome.switches.len(), 1);
        assert_eq!(outcome.switches[0].uid, "a");
        assert_eq!(outcome.switches[0].previous.as_deref(), Some("b"));
        assert_eq!(f.engine.current_device(Direction::Output), Some("a"));
        assert_eq!(f.engine.state(Direction::Output), SwitchState::ActiveAndStable);
    }

    #[test]
    fn test_evaluate_is_idempotent_once_settled() {
        let mut f = Fixture::new(&[speaker("a"), speaker("b")]);
        f.evaluate();
        f.audio.clear_set_device_calls();

        assert!(f.evaluate().is_empty());
        assert!(f.audio.get_set_device_calls().is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_then_expires() {
        let mut f = Fixture::new(&[speaker("y"), speaker("x")]);
        f.evaluate();
        assert_eq!(f.engine.current_device(Direction::Output), Some("y"));

        let x = f.output("x");
        assert!(f.engine.set_device(&x, Direction::Output, true).is_some());
        assert_eq!(f.engine.state(Direction::Output), SwitchState::ManualOverrideActive);

        f.clock.advance_ms(1000);
        let outcome = f.evaluate();
        assert!(outcome.suppressed);
        assert_eq!(f.engine.current_device(Direction::Output), Some("x"));

        f.clock.advance_ms(3000);
        let outcome = f.evaluate();
        assert_eq!(outcome.switches[0].uid, "y");
        assert_eq!(f.engine.current_device(Direction::Output), Some("y"));
        assert_eq!(f.engine.state(Direction::Output), SwitchState::ActiveAndStable);
    }

    #[test]
    fn test_automatic_switch_does_not_start_cooldown() {
        let mut f = Fixture::new(&[speaker("a")]);
        f.evaluate();
        assert!(f.engine.last_manual_switch().is_none());
        assert!(!f.engine.in_cooldown());
    }

    #[test]
    fn test_no_candidate_leaves_hardware_untouched() {
        let mut f = Fixture::new(&[speaker("a")]);
        f.evaluate();
        f.registry
            .editor()
            .toggle_enabled(&DeviceKey::new(Direction::Output, "a"));
        f.audio.clear_set_device_calls();

        let outcome = f.evaluate();

        assert!(outcome.is_empty());
        assert!(f.audio.get_set_device_calls().is_empty());
        assert_eq!(f.engine.current_device(Direction::Output), Some("a"));
    }

    #[test]
    fn test_disconnected_active_without_alternative_clears_selection() {
        let mut f = Fixture::new(&[speaker("a")]);
        f.evaluate();
        // Hardware still reports the stale default
        f.audio.devices.lock().unwrap().clear();
        f.registry.refresh(&[], f.clock.now());

        let outcome = f.evaluate();

        assert_eq!(outcome.cleared, vec![Direction::Output]);
        assert_eq!(f.engine.current_device(Direction::Output), None);
        assert_eq!(f.engine.state(Direction::Output), SwitchState::NoActive);
    }

    #[test]
    fn test_set_failure_is_not_recorded_and_is_retried() {
        let mut f = Fixture::new(&[speaker("a")]);
        f.audio.set_device_setting_failure(true);

        let outcome = f.evaluate();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(f.engine.current_device(Direction::Output), None);

        f.audio.set_device_setting_failure(false);
        let outcome = f.evaluate();
        assert_eq!(outcome.switches.len(), 1);
        assert_eq!(f.engine.current_device(Direction::Output), Some("a"));
        assert_eq!(f.audio.get_set_device_calls().len(), 2);
    }

    #[test]
    fn test_failed_manual_switch_does_not_start_cooldown() {
        let mut f = Fixture::new(&[speaker("a")]);
        f.audio.set_device_setting_failure(true);

        let a = f.output("a");
        assert!(f.engine.set_device(&a, Direction::Output, true).is_none());
        assert!(!f.engine.in_cooldown());
    }

    #[test]
    fn test_set_device_rejects_unavailable() {
        let mut f = Fixture::new(&[speaker("a")]);
        let mut a = f.output("a");

        a.is_enabled = false;
        assert!(f.engine.set_device(&a, Direction::Output, true).is_none());

        a.is_enabled = true;
        a.is_currently_connected = false;
        assert!(f.engine.set_device(&a, Direction::Output, true).is_none());

        a.is_currently_connected = true;
        assert!(f.engine.set_device(&a, Direction::Input, true).is_none());

        assert!(f.audio.get_set_device_calls().is_empty());
        assert!(!f.engine.in_cooldown());
    }

    #[test]
    fn test_default_query_failure_keeps_cached_selection() {
        let mut f = Fixture::new(&[speaker("a"), speaker("b")]);
        f.evaluate();
        f.audio.set_default_query_failure(true);
        f.audio.clear_set_device_calls();

        let outcome = f.evaluate();

        assert!(outcome.is_empty());
        assert_eq!(f.engine.current_device(Direction::Output), Some("a"));
    }

    #[test]
    fn test_external_default_change_is_corrected() {
        let mut f = Fixture::new(&[speaker("a"), speaker("b")]);
        f.evaluate();
        f.audio.set_mock_default(Direction::Output, Some("b"));

        let outcome = f.evaluate();
        assert_eq!(outcome.switches[0].previous.as_deref(), Some("b"));
        assert_eq!(f.audio.mock_default(Direction::Output).as_deref(), Some("a"));
    }

    #[test]
    fn test_clear_manual_override() {
        let mut f = Fixture::new(&[speaker("a"), speaker("b")]);
        let b = f.output("b");
        f.engine.set_device(&b, Direction::Output, true);
        assert!(f.engine.in_cooldown());

        f.engine.clear_manual_override();
        let outcome = f.evaluate();
        assert_eq!(outcome.switches[0].uid, "a");
    }
}
