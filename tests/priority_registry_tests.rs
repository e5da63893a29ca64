use audio_cascade::audio::{DeviceKey, DeviceSnapshot, Direction};
use audio_cascade::config::NewDevicePlacement;
use audio_cascade::priority::registry::{INPUT_DEVICES_KEY, OUTPUT_DEVICES_KEY};
use audio_cascade::priority::{DeviceList, DeviceRegistry, MoveDirection, ensure_unique_priorities};
use audio_cascade::system::MemoryStore;
use chrono::Duration;
use std::collections::HashSet;

mod test_utils;
use test_utils::{DeviceBuilder, SnapshotBuilder, fixed_time, scenarios};

fn mics(uids: &[&str]) -> Vec<DeviceSnapshot> {
    uids.iter()
        .map(|uid| SnapshotBuilder::new(uid).input().build())
        .collect()
}

fn registry_with(uids: &[&str]) -> DeviceRegistry<MemoryStore> {
    let mut registry = DeviceRegistry::load(MemoryStore::new(), NewDevicePlacement::Bottom);
    registry.refresh(&mics(uids), fixed_time());
    registry
}

fn order(list: &DeviceList) -> Vec<(&str, u32)> {
    list.iter().map(|d| (d.uid.as_str(), d.priority)).collect()
}

fn input(uid: &str) -> DeviceKey {
    DeviceKey::new(Direction::Input, uid)
}

fn assert_well_formed(list: &DeviceList) {
    let priorities: HashSet<u32> = list.iter().map(|d| d.priority).collect();
    assert_eq!(priorities.len(), list.len(), "duplicate ranks in {:?}", order(list));
    assert!(
        list.devices().windows(2).all(|w| w[0].priority < w[1].priority),
        "unsorted list {:?}",
        order(list)
    );
    assert!(list.iter().all(|d| d.priority > 0));
}

#[cfg(test)]
mod list_invariants {
    use super::*;

    #[test]
    fn test_invariants_hold_across_edit_sequences() {
        let store = MemoryStore::new();
        let mut registry = DeviceRegistry::load(store, NewDevicePlacement::Top);
        let all = ["a", "b", "c", "d", "e", "f"];

        // Small deterministic LCG so the sequence is reproducible
        let mut seed: u64 = 0x5eed;
        let mut next = |bound: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize % bound
        };

        let mut now = fixed_time();
        for step in 0..400 {
            now += Duration::seconds(1);
            let uid = all[next(all.len())];
            match next(8) {
                0 => {
                    let present: Vec<&str> = all.iter().copied().filter(|_| next(3) > 0).collect();
                    registry.refresh(&mics(&present), now);
                }
                1 => {
                    registry.editor().move_device(&input(uid), MoveDirection::Up);
                }
                2 => {
                    registry.editor().move_device(&input(uid), MoveDirection::Down);
                }
                3 => {
                    let len = registry.input().len().max(1);
                    registry
                        .editor()
                        .reorder_device(Direction::Input, next(len), next(len));
                }
                4 => {
                    let rank = next(10) as u32;
                    registry.editor().update_device_priority(&input(uid), rank);
                }
                5 => {
                    registry.editor().toggle_enabled(&input(uid));
                }
                6 if step % 50 == 0 => {
                    registry.editor().clear_disconnected_devices();
                }
                _ => {
                    registry.editor().reset_all_priorities();
                }
            }

            assert_well_formed(registry.input());
            assert_eq!(
                ensure_unique_priorities(registry.input().to_vec()),
                registry.input().to_vec(),
                "conflict resolution changed a well-formed list at step {step}"
            );
        }
    }

    #[test]
    fn test_resolution_is_idempotent_on_messy_input() {
        let messy = vec![
            DeviceBuilder::new("a").input().priority(3).build(),
            DeviceBuilder::new("b").input().priority(3).build(),
            DeviceBuilder::new("c").input().priority(0).build(),
            DeviceBuilder::new("d").input().priority(1).build(),
            DeviceBuilder::new("e").input().priority(1).build(),
        ];

        let once = ensure_unique_priorities(messy);
        let twice = ensure_unique_priorities(once.clone());

        assert_eq!(once, twice);
        assert_well_formed(&DeviceList::from_devices(Direction::Input, once));
    }

    #[test]
    fn test_duplex_device_ranked_independently_per_direction() {
        let mut registry = DeviceRegistry::load(MemoryStore::new(), NewDevicePlacement::Bottom);
        registry.refresh(&scenarios::desk_setup(), fixed_time());

        assert_eq!(
            order(registry.input()),
            vec![("usb-mic", 1), ("headset", 2), ("builtin-mic", 3)]
        );
        assert_eq!(
            order(registry.output()),
            vec![("headset", 1), ("builtin-speakers", 2)]
        );

        registry.editor().move_device(&input("headset"), MoveDirection::Up);

        assert_eq!(registry.input().get("headset").unwrap().priority, 1);
        assert_eq!(registry.output().get("headset").unwrap().priority, 1);
        assert_eq!(registry.output().get("builtin-speakers").unwrap().priority, 2);
    }
}

#[cfg(test)]
mod connection_history {
    use super::*;

    #[test]
    fn test_disconnect_keeps_rank_and_settings() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.editor().toggle_enabled(&input("b"));
        registry.editor().assign_shortcut("b", Some("cmd+b".parse().unwrap()));

        let later = fixed_time() + Duration::minutes(5);
        registry.refresh(&mics(&["a", "c"]), later);

        let b = registry.input().get("b").unwrap();
        assert!(!b.is_currently_connected);
        assert!(!b.is_enabled);
        assert_eq!(b.priority, 2);
        assert!(b.keyboard_shortcut.is_some());
        assert_eq!(b.last_seen, fixed_time());
        assert_eq!(registry.input().get("a").unwrap().last_seen, later);
    }

    #[test]
    fn test_reconnect_restores_original_position() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.refresh(&mics(&["b", "c"]), fixed_time());
        let outcome = registry.refresh(&mics(&["a", "b", "c"]), fixed_time());

        assert_eq!(outcome.reconnected, vec![input("a")]);
        assert_eq!(order(registry.input()), vec![("a", 1), ("b", 2), ("c", 3)]);
        assert!(registry.input().iter().all(|d| d.is_currently_connected));
    }

    #[test]
    fn test_clear_disconnected_renumbers_survivors() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.refresh(&mics(&["a", "c"]), fixed_time());

        assert!(registry.editor().clear_disconnected_devices());

        assert_eq!(order(registry.input()), vec![("a", 1), ("c", 2)]);
    }

    #[test]
    fn test_rename_is_picked_up_on_refresh() {
        let mut registry = registry_with(&["a"]);
        registry.refresh(
            &[SnapshotBuilder::new("a").name("Renamed Mic").input().build()],
            fixed_time(),
        );
        assert_eq!(registry.input().get("a").unwrap().name, "Renamed Mic");
    }
}

#[cfg(test)]
mod placement {
    use super::*;

    #[test]
    fn test_bottom_placement_never_outranks_known_devices() {
        let mut registry = registry_with(&["a", "b"]);
        let outcome = registry.refresh(&mics(&["a", "b", "new"]), fixed_time());

        assert_eq!(outcome.discovered, vec![input("new")]);
        assert_eq!(order(registry.input()), vec![("a", 1), ("b", 2), ("new", 3)]);
    }

    #[test]
    fn test_top_placement_takes_rank_one() {
        let mut registry = DeviceRegistry::load(MemoryStore::new(), NewDevicePlacement::Top);
        registry.refresh(&mics(&["a", "b"]), fixed_time());
        // First discovery with an empty list keeps snapshot order
        assert_eq!(order(registry.input()), vec![("a", 1), ("b", 2)]);

        registry.refresh(&mics(&["a", "b", "new"]), fixed_time());
        assert_eq!(order(registry.input()), vec![("new", 1), ("a", 2), ("b", 3)]);
    }

    #[test]
    fn test_placement_can_change_at_runtime() {
        let mut registry = registry_with(&["a"]);
        registry.set_placement(NewDevicePlacement::Top);
        registry.refresh(&mics(&["a", "b"]), fixed_time());
        assert_eq!(order(registry.input()), vec![("b", 1), ("a", 2)]);
    }
}

#[cfg(test)]
mod persistence {
    use super::*;

    #[test]
    fn test_lists_survive_reload() {
        let store = MemoryStore::new();
        let mut registry = DeviceRegistry::load(store.clone(), NewDevicePlacement::Bottom);
        registry.refresh(&scenarios::desk_setup(), fixed_time());
        registry.editor().move_device(&input("builtin-mic"), MoveDirection::Up);
        registry.editor().toggle_enabled(&input("usb-mic"));

        let reloaded = DeviceRegistry::load(store, NewDevicePlacement::Bottom);

        assert_eq!(reloaded.input(), registry.input());
        assert_eq!(reloaded.output(), registry.output());
        assert!(!reloaded.input().get("usb-mic").unwrap().is_enabled);
    }

    #[test]
    fn test_undecodable_list_falls_back_to_empty() {
        let store = MemoryStore::new();
        store.insert(INPUT_DEVICES_KEY, b"{ definitely not a list".to_vec());
        store.insert(OUTPUT_DEVICES_KEY, b"[]".to_vec());

        let mut registry = DeviceRegistry::load(store.clone(), NewDevicePlacement::Bottom);
        assert!(registry.input().is_empty());
        assert!(registry.output().is_empty());

        // The next refresh overwrites the bad data with a valid list
        registry.refresh(&mics(&["a"]), fixed_time());
        let reloaded = DeviceRegistry::load(store, NewDevicePlacement::Bottom);
        assert_eq!(order(reloaded.input()), vec![("a", 1)]);
    }

    #[test]
    fn test_saved_records_from_the_wrong_list_are_dropped() {
        let store = MemoryStore::new();
        let speakers = DeviceBuilder::new("spk").output().priority(1).build();
        let mic = DeviceBuilder::new("mic").input().priority(2).build();
        store.insert(
            INPUT_DEVICES_KEY,
            serde_json::to_vec(&vec![speakers, mic]).unwrap(),
        );

        let registry = DeviceRegistry::load(store, NewDevicePlacement::Bottom);
        assert_eq!(order(registry.input()), vec![("mic", 2)]);
    }

    #[test]
    fn test_reload_picks_up_external_edits() {
        let store = MemoryStore::new();
        let mut daemon_view = DeviceRegistry::load(store.clone(), NewDevicePlacement::Bottom);
        daemon_view.refresh(&mics(&["a", "b"]), fixed_time());

        let mut cli_view = DeviceRegistry::load(store, NewDevicePlacement::Bottom);
        cli_view.editor().move_device(&input("b"), MoveDirection::Up);

        assert_eq!(order(daemon_view.input()), vec![("a", 1), ("b", 2)]);
        daemon_view.reload();
        assert_eq!(order(daemon_view.input()), vec![("b", 1), ("a", 2)]);
    }
}

#[cfg(test)]
mod shortcuts {
    use super::*;

    #[test]
    fn test_chord_moves_between_devices() {
        let mut registry = DeviceRegistry::load(MemoryStore::new(), NewDevicePlacement::Bottom);
        registry.refresh(&scenarios::desk_setup(), fixed_time());
        let chord = "ctrl+opt+1".parse().unwrap();

        registry.editor().assign_shortcut("headset", Some(chord));
        registry
            .editor()
            .assign_shortcut("builtin-speakers", Some("option+control+1".parse().unwrap()));

        let bound: Vec<&str> = registry
            .all_devices()
            .filter(|d| d.keyboard_shortcut.is_some())
            .map(|d| d.uid.as_str())
            .collect();
        assert_eq!(bound, vec!["builtin-speakers"]);
    }

    #[test]
    fn test_special_character_names_round_trip() {
        let store = MemoryStore::new();
        let mut registry = DeviceRegistry::load(store.clone(), NewDevicePlacement::Bottom);
        registry.refresh(&scenarios::special_character_devices(), fixed_time());

        let reloaded = DeviceRegistry::load(store, NewDevicePlacement::Bottom);
        let names: Vec<&str> = reloaded.output().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["🎵 Music Device 🎵", "Bob's \"Studio\" Monitor", ""]);
    }
}
