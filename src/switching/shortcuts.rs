use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::audio::{Device, Direction, KeyboardShortcut, Modifier};
use crate::priority::DeviceRegistry;
use crate::system::PersistenceStore;

/// A key press captured by the UI: the key and the modifiers held with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub key: String,
    pub modifiers: BTreeSet<Modifier>,
}

impl KeyChord {
    pub fn new(key: impl Into<String>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Self {
            key: key.into(),
            modifiers: modifiers.into_iter().collect(),
        }
    }
}

impl FromStr for KeyChord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parsed: KeyboardShortcut = s.parse()?;
        Ok(Self {
            key: parsed.key,
            modifiers: parsed.modifiers,
        })
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shortcut = KeyboardShortcut::new(self.key.clone(), self.modifiers.iter().copied());
        write!(f, "{}", shortcut)
    }
}

/// Device a chord resolved to, with the directions it can be switched in.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortcutMatch {
    pub device: Device,
    pub directions: Vec<Direction>,
}

impl ShortcutMatch {
    pub fn title(&self) -> String {
        format!("Switched to {}", self.device.name)
    }

    pub fn subtitle(&self) -> String {
        match self.directions.as_slice() {
            [Direction::Input] => "Input".to_string(),
            [Direction::Output] => "Output".to_string(),
            _ => "Input & Output".to_string(),
        }
    }
}

pub struct ShortcutDispatcher;

impl ShortcutDispatcher {
    /// Resolve a chord to a device. Chords without modifiers are never
    /// consumed. Input entries are scanned before output entries and only
    /// enabled, connected devices match.
    pub fn find_match<S: PersistenceStore>(
        registry: &DeviceRegistry<S>,
        chord: &KeyChord,
    ) -> Option<ShortcutMatch> {
        if chord.modifiers.is_empty() {
            return None;
        }

        let device = registry.all_devices().find(|d| {
            d.is_selectable()
                && d.keyboard_shortcut
                    .as_ref()
                    .is_some_and(|s| s.matches(&chord.key, &chord.modifiers))
        })?;

        let directions = Direction::ALL
            .into_iter()
            .filter(|direction| {
                registry
                    .list(*direction)
                    .get(&device.uid)
                    .is_some_and(Device::is_selectable)
            })
            .collect();

        Some(ShortcutMatch {
            device: device.clone(),
            directions,
        })
    }
}
