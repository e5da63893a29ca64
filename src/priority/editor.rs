use tracing::{debug, info};

use crate::audio::{DeviceKey, Direction, KeyboardShortcut};
use crate::system::PersistenceStore;

use super::registry::DeviceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// User-facing list edits. Each operation builds the replacement list
/// first and swaps it in, so a caller never observes a half-renumbered list.
/// Every change is persisted before returning.
pub struct PriorityListEditor<'a, S: PersistenceStore> {
    registry: &'a mut DeviceRegistry<S>,
}

impl<S: PersistenceStore> DeviceRegistry<S> {
    pub fn editor(&mut self) -> PriorityListEditor<'_, S> {
        PriorityListEditor { registry: self }
    }
}

impl<'a, S: PersistenceStore> PriorityListEditor<'a, S> {
    /// Swap a device with its neighbour and rank the list by position.
    /// Moving past either end does nothing.
    pub fn move_device(&mut self, key: &DeviceKey, movement: MoveDirection) -> bool {
        let list = self.registry.list(key.direction);
        let Some(index) = list.position(&key.uid) else {
            debug!("Cannot move unknown device {}", key);
            return false;
        };

        let target = match movement {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < list.len() => index + 1,
            _ => return false,
        };

        let mut devices = list.to_vec();
        devices.swap(index, target);
        self.registry
            .list_mut(key.direction)
            .replace_in_order(devices);

        info!("Moved {} {:?} to position {}", key, movement, target + 1);
        self.commit()
    }

    /// Remove the device at `from` and reinsert it so it ends up at `to`.
    pub fn reorder_device(&mut self, direction: Direction, from: usize, to: usize) -> bool {
        let list = self.registry.list(direction);
        if from >= list.len() || to >= list.len() || from == to {
            return false;
        }

        let mut devices = list.to_vec();
        let device = devices.remove(from);
        devices.insert(to, device);
        self.registry.list_mut(direction).replace_in_order(devices);

        info!("Reordered {} device from {} to {}", direction, from + 1, to + 1);
        self.commit()
    }

    /// Give a device an explicit rank. The edited device wins ties against
    /// devices that already held that rank; the rest are resolved by the
    /// usual conflict rule.
    pub fn update_device_priority(&mut self, key: &DeviceKey, new_priority: u32) -> bool {
        if new_priority == 0 {
            return false;
        }

        let list = self.registry.list(key.direction);
        let Some(index) = list.position(&key.uid) else {
            return false;
        };
        if list.devices()[index].priority == new_priority {
            return false;
        }

        let mut devices = list.to_vec();
        let mut edited = devices.remove(index);
        edited.priority = new_priority;
        let insert_at = devices
            .iter()
            .position(|d| d.priority >= new_priority)
            .unwrap_or(devices.len());
        devices.insert(insert_at, edited);
        self.registry.list_mut(key.direction).replace(devices);

        info!("Set priority of {} to {}", key, new_priority);
        self.commit()
    }

    /// Flip the enabled flag. Ranks are left alone. Returns the new state.
    pub fn toggle_enabled(&mut self, key: &DeviceKey) -> Option<bool> {
        let list = self.registry.list(key.direction);
        let index = list.position(&key.uid)?;

        let mut devices = list.to_vec();
        let device = &mut devices[index];
        device.is_enabled = !device.is_enabled;
        let enabled = device.is_enabled;
        self.registry.list_mut(key.direction).replace(devices);

        info!(
            "{} {}",
            if enabled { "Enabled" } else { "Disabled" },
            key
        );
        self.commit();
        Some(enabled)
    }

    /// Rank both lists 1..N in their current order.
    pub fn reset_all_priorities(&mut self) -> bool {
        for direction in Direction::ALL {
            self.registry.list_mut(direction).renumber();
        }
        info!("Reset all priorities");
        self.commit()
    }

    /// Drop every disconnected device from both lists and rank what is left
    /// 1..N in its existing order. Returns whether anything was removed.
    pub fn clear_disconnected_devices(&mut self) -> bool {
        let mut removed = 0;
        for direction in Direction::ALL {
            let list = self.registry.list(direction);
            let before = list.len();
            let kept: Vec<_> = list
                .iter()
                .filter(|d| d.is_currently_connected)
                .cloned()
                .collect();
            removed += before - kept.len();
            self.registry.list_mut(direction).replace_in_order(kept);
        }

        info!("Cleared {} disconnected device entries", removed);
        self.commit();
        removed > 0
    }

    /// Bind (or with `None`, unbind) a chord for every entry of a device.
    /// A chord belongs to at most one device: binding it removes it from
    /// any other device whose chord would fire on the same keystroke.
    pub fn assign_shortcut(&mut self, uid: &str, shortcut: Option<KeyboardShortcut>) -> bool {
        if !self.registry.all_devices().any(|d| d.uid == uid) {
            debug!("Cannot bind shortcut for unknown device {}", uid);
            return false;
        }

        for direction in Direction::ALL {
            let mut devices = self.registry.list(direction).to_vec();
            for device in devices.iter_mut() {
                if device.uid == uid {
                    device.keyboard_shortcut = shortcut.clone();
                } else if shortcut.as_ref().is_some_and(|new| {
                    device
                        .keyboard_shortcut
                        .as_ref()
                        .is_some_and(|old| old.matches(&new.key, &new.modifiers))
                }) {
                    info!("Shortcut moved from {} to {}", device.name, uid);
                    device.keyboard_shortcut = None;
                }
            }
            self.registry.list_mut(direction).replace(devices);
        }

        self.commit()
    }

    fn commit(&mut self) -> bool {
        self.registry.persist();
        true
    }
}
