//! Test utility builders for hardware snapshots and saved device records
//!
//! Individual methods may not be used by all tests, so dead code warnings are suppressed.

#![allow(dead_code)]

use audio_cascade::audio::{Device, DeviceSnapshot, KeyboardShortcut};
use chrono::{DateTime, TimeZone, Utc};

/// Builder for what the hardware reports about one endpoint
pub struct SnapshotBuilder {
    uid: String,
    name: Option<String>,
    is_input: bool,
    is_output: bool,
}

impl SnapshotBuilder {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: None,
            is_input: false,
            is_output: true,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn input(mut self) -> Self {
        self.is_input = true;
        self.is_output = false;
        self
    }

    pub fn output(mut self) -> Self {
        self.is_input = false;
        self.is_output = true;
        self
    }

    pub fn duplex(mut self) -> Self {
        self.is_input = true;
        self.is_output = true;
        self
    }

    pub fn build(self) -> DeviceSnapshot {
        let name = self.name.unwrap_or_else(|| format!("Device {}", self.uid));
        DeviceSnapshot::new(self.uid, name, self.is_input, self.is_output)
    }
}

/// Builder for a saved ranked record, as it would be found in the store
pub struct DeviceBuilder {
    snapshot: SnapshotBuilder,
    priority: u32,
    enabled: bool,
    connected: bool,
    last_seen: DateTime<Utc>,
    shortcut: Option<KeyboardShortcut>,
}

impl DeviceBuilder {
    pub fn new(uid: &str) -> Self {
        Self {
            snapshot: SnapshotBuilder::new(uid),
            priority: 1,
            enabled: true,
            connected: true,
            last_seen: fixed_time(),
            shortcut: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.snapshot = self.snapshot.name(name);
        self
    }

    pub fn input(mut self) -> Self {
        self.snapshot = self.snapshot.input();
        self
    }

    pub fn output(mut self) -> Self {
        self.snapshot = self.snapshot.output();
        self
    }

    pub fn duplex(mut self) -> Self {
        self.snapshot = self.snapshot.duplex();
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn shortcut(mut self, chord: &str) -> Self {
        self.shortcut = Some(chord.parse().expect("valid chord"));
        self
    }

    pub fn build(self) -> Device {
        let mut device = Device::discovered(&self.snapshot.build(), self.priority, self.last_seen);
        device.is_enabled = self.enabled;
        device.is_currently_connected = self.connected;
        device.keyboard_shortcut = self.shortcut;
        device
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Helper functions for creating common test scenarios
pub mod scenarios {
    use super::*;

    /// A desk with a USB mic, a headset and the built-in hardware
    pub fn desk_setup() -> Vec<DeviceSnapshot> {
        vec![
            SnapshotBuilder::new("usb-mic").name("Shure MV7").input().build(),
            SnapshotBuilder::new("headset")
                .name("AirPods Pro")
                .duplex()
                .build(),
            SnapshotBuilder::new("builtin-mic")
                .name("MacBook Pro Microphone")
                .input()
                .build(),
            SnapshotBuilder::new("builtin-speakers")
                .name("MacBook Pro Speakers")
                .output()
                .build(),
        ]
    }

    /// Devices with names that stress display and matching code
    pub fn special_character_devices() -> Vec<DeviceSnapshot> {
        vec![
            SnapshotBuilder::new("emoji").name("🎵 Music Device 🎵").build(),
            SnapshotBuilder::new("quotes")
                .name("Bob's \"Studio\" Monitor")
                .build(),
            SnapshotBuilder::new("empty").name("").build(),
        ]
    }
}
