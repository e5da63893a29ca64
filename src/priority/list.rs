use std::collections::HashSet;

use crate::audio::{Device, Direction};

/// Ranked devices of one direction.
///
/// Priorities are unique and the backing vector is always sorted ascending
/// by priority; every constructor and mutator goes through
/// [`ensure_unique_priorities`] or [`DeviceList::renumber`] before returning.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceList {
    direction: Direction,
    devices: Vec<Device>,
}

impl DeviceList {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            devices: Vec::new(),
        }
    }

    /// Build a list from records in arbitrary order, resolving conflicts.
    pub fn from_devices(direction: Direction, devices: Vec<Device>) -> Self {
        Self {
            direction,
            devices: ensure_unique_priorities(devices),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.uid == uid)
    }

    pub fn position(&self, uid: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.uid == uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.position(uid).is_some()
    }

    /// First enabled and connected device in priority order.
    pub fn best_candidate(&self) -> Option<&Device> {
        self.devices.iter().find(|d| d.is_selectable())
    }

    pub fn max_priority(&self) -> u32 {
        self.devices.iter().map(|d| d.priority).max().unwrap_or(0)
    }

    /// Copy of the records for building a replacement list.
    pub fn to_vec(&self) -> Vec<Device> {
        self.devices.clone()
    }

    /// Replace the contents, resolving any priority conflicts.
    pub fn replace(&mut self, devices: Vec<Device>) {
        self.devices = ensure_unique_priorities(devices);
    }

    /// Replace the contents and rank them 1..N in the given order.
    pub fn replace_in_order(&mut self, mut devices: Vec<Device>) {
        renumber(&mut devices);
        self.devices = devices;
    }

    /// Rank the current order 1..N.
    pub fn renumber(&mut self) {
        renumber(&mut self.devices);
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

/// Resolve duplicate priorities deterministically and sort.
///
/// Walks the records in their current order. A record whose priority was
/// already claimed earlier in the walk (or is 0, which is never a valid
/// rank) is moved to the lowest positive rank not yet claimed. The result
/// is stably sorted ascending. Running it twice yields the same list.
pub fn ensure_unique_priorities(mut devices: Vec<Device>) -> Vec<Device> {
    let mut claimed: HashSet<u32> = HashSet::with_capacity(devices.len());

    for device in devices.iter_mut() {
        if device.priority == 0 || claimed.contains(&device.priority) {
            let mut next = 1;
            while claimed.contains(&next) {
                next += 1;
            }
            device.priority = next;
        }
        claimed.insert(device.priority);
    }

    devices.sort_by_key(|d| d.priority);
    devices
}

/// Assign ranks 1..N by position.
pub fn renumber(devices: &mut [Device]) {
    for (index, device) in devices.iter_mut().enumerate() {
        device.priority = index as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceSnapshot;
    use chrono::Utc;

    fn device(uid: &str, priority: u32) -> Device {
        Device::discovered(
            &DeviceSnapshot::new(uid, uid.to_uppercase(), true, false),
            priority,
            Utc::now(),
        )
    }

    fn ranks(devices: &[Device]) -> Vec<(String, u32)> {
        devices
            .iter()
            .map(|d| (d.uid.clone(), d.priority))
            .collect()
    }

    #[test]
    fn test_unique_priorities_are_only_sorted() {
        let result = ensure_unique_priorities(vec![device("c", 3), device("a", 1), device("b", 2)]);
        assert_eq!(
            ranks(&result),
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
        );
    }

    #[test]
    fn test_later_duplicate_takes_lowest_free_rank() {
        // "b" collides with "a"; 1 and 3 are claimed by then, so "b" takes 2.
        let result = ensure_unique_priorities(vec![device("a", 1), device("c", 3), device("b", 1)]);
        assert_eq!(
            ranks(&result),
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
        );
    }

    #[test]
    fn test_reassigned_rank_only_considers_earlier_claims() {
        // "b" is reassigned to 2 before "c" claims 2, so "c" is pushed to 3.
        let result = ensure_unique_priorities(vec![device("a", 1), device("b", 1), device("c", 2)]);
        assert_eq!(
            ranks(&result),
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
        );
    }

    #[test]
    fn test_zero_priority_is_reassigned() {
        let result = ensure_unique_priorities(vec![device("a", 0), device("b", 2)]);
        assert_eq!(ranks(&result), vec![("a".into(), 1), ("b".into(), 2)]);
    }

    #[test]
    fn test_all_duplicates() {
        let result = ensure_unique_priorities(vec![
            device("a", 7),
            device("b", 7),
            device("c", 7),
            device("d", 7),
        ]);
        assert_eq!(
            ranks(&result),
            vec![
                ("b".into(), 1),
                ("c".into(), 2),
                ("d".into(), 3),
                ("a".into(), 7)
            ]
        );
    }

    #[test]
    fn test_conflict_resolution_is_idempotent() {
        let inputs = vec![
            vec![device("a", 5), device("b", 5), device("c", 1), device("d", 0)],
            vec![device("a", 2), device("b", 2), device("c", 2)],
            vec![device("a", u32::MAX), device("b", u32::MAX)],
            vec![],
        ];

        for input in inputs {
            let once = ensure_unique_priorities(input);
            let twice = ensure_unique_priorities(once.clone());
            assert_eq!(once, twice);

            let priorities: HashSet<u32> = once.iter().map(|d| d.priority).collect();
            assert_eq!(priorities.len(), once.len());
            assert!(once.windows(2).all(|w| w[0].priority < w[1].priority));
        }
    }

    #[test]
    fn test_best_candidate_skips_disabled_and_disconnected() {
        let mut disabled = device("a", 1);
        disabled.is_enabled = false;
        let mut offline = device("b", 2);
        offline.is_currently_connected = false;
        let list = DeviceList::from_devices(
            Direction::Input,
            vec![disabled, offline, device("c", 3), device("d", 4)],
        );

        assert_eq!(list.best_candidate().map(|d| d.uid.as_str()), Some("c"));
    }

    #[test]
    fn test_replace_in_order_renumbers() {
        let mut list = DeviceList::from_devices(Direction::Output, vec![device("a", 4), device("b", 9)]);
        let mut devices = list.to_vec();
        devices.reverse();
        list.replace_in_order(devices);

        assert_eq!(ranks(list.devices()), vec![("b".into(), 1), ("a".into(), 2)]);
        assert_eq!(list.max_priority(), 2);
    }
}
