use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::audio::{Device, DeviceKey, DeviceSnapshot, Direction};
use crate::config::NewDevicePlacement;
use crate::system::PersistenceStore;

use super::list::DeviceList;

pub const INPUT_DEVICES_KEY: &str = "input_devices";
pub const OUTPUT_DEVICES_KEY: &str = "output_devices";

/// What a refresh changed, so callers can decide how soon to re-evaluate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    pub discovered: Vec<DeviceKey>,
    pub reconnected: Vec<DeviceKey>,
    pub disconnected: Vec<DeviceKey>,
}

impl RefreshOutcome {
    /// A brand-new device appeared; evaluate right away.
    pub fn requires_immediate_evaluation(&self) -> bool {
        !self.discovered.is_empty()
    }

    /// Only known devices came back; evaluate after the debounce.
    pub fn requires_deferred_evaluation(&self) -> bool {
        self.discovered.is_empty() && !self.reconnected.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty() && self.reconnected.is_empty() && self.disconnected.is_empty()
    }
}

/// Owns the input and output ranked lists and their persisted form.
pub struct DeviceRegistry<S: PersistenceStore> {
    store: S,
    placement: NewDevicePlacement,
    input: DeviceList,
    output: DeviceList,
}

impl<S: PersistenceStore> DeviceRegistry<S> {
    /// Load both lists from the store. Unreadable or undecodable data starts
    /// that list empty.
    pub fn load(store: S, placement: NewDevicePlacement) -> Self {
        let input = load_list(&store, Direction::Input);
        let output = load_list(&store, Direction::Output);

        info!(
            "Loaded device registry: {} input, {} output devices",
            input.len(),
            output.len()
        );

        Self {
            store,
            placement,
            input,
            output,
        }
    }

    /// Re-read both lists from the store, replacing the in-memory state.
    pub fn reload(&mut self) {
        self.input = load_list(&self.store, Direction::Input);
        self.output = load_list(&self.store, Direction::Output);
        debug!(
            "Reloaded device registry: {} input, {} output devices",
            self.input.len(),
            self.output.len()
        );
    }

    pub fn input(&self) -> &DeviceList {
        &self.input
    }

    pub fn output(&self) -> &DeviceList {
        &self.output
    }

    pub fn list(&self, direction: Direction) -> &DeviceList {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    pub(crate) fn list_mut(&mut self, direction: Direction) -> &mut DeviceList {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }

    pub fn find(&self, key: &DeviceKey) -> Option<&Device> {
        self.list(key.direction).get(&key.uid)
    }

    /// Input entries followed by output entries.
    pub fn all_devices(&self) -> impl Iterator<Item = &Device> {
        self.input.iter().chain(self.output.iter())
    }

    pub fn placement(&self) -> NewDevicePlacement {
        self.placement
    }

    pub fn set_placement(&mut self, placement: NewDevicePlacement) {
        self.placement = placement;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Merge a hardware snapshot into both lists and persist.
    ///
    /// Known devices only have their connection flag updated; devices the
    /// snapshot omits are kept as disconnected. Unknown endpoints are added
    /// enabled and ranked according to the placement policy.
    pub fn refresh(&mut self, snapshot: &[DeviceSnapshot], now: DateTime<Utc>) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();

        for direction in Direction::ALL {
            let reported = reported_for(snapshot, direction);
            let mut devices = self.list(direction).to_vec();

            for device in devices.iter_mut() {
                let was_connected = device.is_currently_connected;
                device.is_currently_connected = false;

                if let Some(seen) = reported.iter().find(|s| s.uid == device.uid) {
                    device.is_currently_connected = true;
                    device.last_seen = now;
                    device.name = seen.name.clone();
                    device.is_input = seen.is_input;
                    device.is_output = seen.is_output;

                    if !was_connected {
                        debug!("{} device reconnected: {}", direction, device.name);
                        outcome
                            .reconnected
                            .push(DeviceKey::new(direction, device.uid.clone()));
                    }
                } else if was_connected {
                    debug!("{} device disconnected: {}", direction, device.name);
                    outcome
                        .disconnected
                        .push(DeviceKey::new(direction, device.uid.clone()));
                }
            }

            let known: HashSet<String> = devices.iter().map(|d| d.uid.clone()).collect();
            let new_devices: Vec<&DeviceSnapshot> = reported
                .into_iter()
                .filter(|s| !known.contains(&s.uid))
                .collect();

            if !new_devices.is_empty() {
                place_new_devices(&mut devices, &new_devices, self.placement, now);
                for snapshot in &new_devices {
                    info!("Discovered {} device: {}", direction, snapshot.name);
                    outcome
                        .discovered
                        .push(DeviceKey::new(direction, snapshot.uid.clone()));
                }
            }

            self.list_mut(direction).replace(devices);
        }

        self.persist();
        outcome
    }

    /// Write both lists to the store. Failures are logged and otherwise
    /// ignored; the in-memory lists stay authoritative.
    pub fn persist(&self) {
        for list in [&self.input, &self.output] {
            if let Err(e) = save_list(&self.store, list) {
                warn!("Failed to persist {} devices: {:#}", list.direction(), e);
            }
        }
    }
}

fn storage_key(direction: Direction) -> &'static str {
    match direction {
        Direction::Input => INPUT_DEVICES_KEY,
        Direction::Output => OUTPUT_DEVICES_KEY,
    }
}

/// Endpoints reported for a direction, first occurrence of each uid only.
fn reported_for(snapshot: &[DeviceSnapshot], direction: Direction) -> Vec<&DeviceSnapshot> {
    let mut seen = HashSet::new();
    snapshot
        .iter()
        .filter(|s| s.supports(direction))
        .filter(|s| seen.insert(s.uid.clone()))
        .collect()
}

fn place_new_devices(
    devices: &mut Vec<Device>,
    new_devices: &[&DeviceSnapshot],
    placement: NewDevicePlacement,
    now: DateTime<Utc>,
) {
    match placement {
        NewDevicePlacement::Bottom => {
            let mut next = devices.iter().map(|d| d.priority).max().unwrap_or(0);
            for snapshot in new_devices {
                next = next.saturating_add(1);
                devices.push(Device::discovered(snapshot, next, now));
            }
        }
        NewDevicePlacement::Top => {
            let shift = new_devices.len() as u32;
            for device in devices.iter_mut() {
                device.priority = device.priority.saturating_add(shift);
            }
            let mut placed: Vec<Device> = new_devices
                .iter()
                .enumerate()
                .map(|(index, snapshot)| Device::discovered(snapshot, index as u32 + 1, now))
                .collect();
            placed.append(devices);
            *devices = placed;
        }
    }
}

fn load_list<S: PersistenceStore>(store: &S, direction: Direction) -> DeviceList {
    match decode_list(store, direction) {
        Ok(devices) => DeviceList::from_devices(direction, devices),
        Err(e) => {
            warn!(
                "Could not load saved {} devices, starting empty: {:#}",
                direction, e
            );
            DeviceList::new(direction)
        }
    }
}

fn decode_list<S: PersistenceStore>(store: &S, direction: Direction) -> Result<Vec<Device>> {
    let key = storage_key(direction);
    let Some(bytes) = store.get(key)? else {
        debug!("No saved {} devices", direction);
        return Ok(Vec::new());
    };

    let devices: Vec<Device> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to decode stored list '{}'", key))?;

    // Records must belong to the list they were stored under
    Ok(devices
        .into_iter()
        .filter(|d| d.supports(direction))
        .collect())
}

fn save_list<S: PersistenceStore>(store: &S, list: &DeviceList) -> Result<()> {
    let key = storage_key(list.direction());
    let bytes = serde_json::to_vec_pretty(list.devices())
        .with_context(|| format!("Failed to encode list '{}'", key))?;
    store.set(key, &bytes)
}
