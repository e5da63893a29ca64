use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Capability class of an endpoint. A device that can do both appears once
/// in each direction's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "Input"),
            Direction::Output => write!(f, "Output"),
        }
    }
}

/// What the hardware reports about one endpoint during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub uid: String,
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
}

impl DeviceSnapshot {
    pub fn new(uid: impl Into<String>, name: impl Into<String>, is_input: bool, is_output: bool) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            is_input,
            is_output,
        }
    }

    pub fn supports(&self, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.is_input,
            Direction::Output => self.is_output,
        }
    }

    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(|d| self.supports(*d))
    }
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.is_input, self.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            (false, false) => "No streams",
        };
        write!(f, "{} ({}) [{}]", self.name, kind, self.uid)
    }
}

/// Identity of a ranked entry: the same physical device is a distinct entry
/// per direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub direction: Direction,
    pub uid: String,
}

impl DeviceKey {
    pub fn new(direction: Direction, uid: impl Into<String>) -> Self {
        Self {
            direction,
            uid: uid.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.direction.as_str(), self.uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Control,
    Option,
    Shift,
    Command,
}

impl Modifier {
    fn symbol(&self) -> &'static str {
        match self {
            Modifier::Control => "⌃",
            Modifier::Option => "⌥",
            Modifier::Shift => "⇧",
            Modifier::Command => "⌘",
        }
    }
}

impl FromStr for Modifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ctrl" | "control" => Ok(Modifier::Control),
            "alt" | "opt" | "option" => Ok(Modifier::Option),
            "shift" => Ok(Modifier::Shift),
            "cmd" | "command" | "super" => Ok(Modifier::Command),
            other => Err(anyhow::anyhow!("Unknown modifier: '{}'", other)),
        }
    }
}

/// A key chord bound to a device. Modifiers are kept as a set so comparison
/// ignores the order they were pressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardShortcut {
    pub key: String,
    pub modifiers: BTreeSet<Modifier>,
}

impl KeyboardShortcut {
    pub fn new(key: impl Into<String>, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Self {
            key: key.into(),
            modifiers: modifiers.into_iter().collect(),
        }
    }

    /// Key compared case-insensitively, modifier set compared exactly.
    pub fn matches(&self, key: &str, modifiers: &BTreeSet<Modifier>) -> bool {
        self.key.to_lowercase() == key.to_lowercase() && &self.modifiers == modifiers
    }

    pub fn display_string(&self) -> String {
        let mut out: String = self.modifiers.iter().map(Modifier::symbol).collect();
        out.push_str(&self.key.to_uppercase());
        out
    }
}

impl fmt::Display for KeyboardShortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

/// Parses chords written as `cmd+shift+a`. The last segment is the key.
impl FromStr for KeyboardShortcut {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let (key, modifiers) = parts
            .split_last()
            .ok_or_else(|| anyhow::anyhow!("Empty shortcut"))?;

        if key.is_empty() {
            return Err(anyhow::anyhow!("Shortcut '{}' has no key", s));
        }

        let modifiers = modifiers
            .iter()
            .map(|m| m.parse::<Modifier>())
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(Self {
            key: key.to_string(),
            modifiers,
        })
    }
}

/// Preference record for one endpoint in one direction's ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub uid: String,
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub priority: u32,
    pub is_enabled: bool,
    pub last_seen: DateTime<Utc>,
    pub is_currently_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard_shortcut: Option<KeyboardShortcut>,
}

impl Device {
    /// A freshly discovered device: enabled, connected, seen now.
    pub fn discovered(snapshot: &DeviceSnapshot, priority: u32, now: DateTime<Utc>) -> Self {
        Self {
            uid: snapshot.uid.clone(),
            name: snapshot.name.clone(),
            is_input: snapshot.is_input,
            is_output: snapshot.is_output,
            priority,
            is_enabled: true,
            last_seen: now,
            is_currently_connected: true,
            keyboard_shortcut: None,
        }
    }

    /// Eligible for selection as the active device.
    pub fn is_selectable(&self) -> bool {
        self.is_enabled && self.is_currently_connected
    }

    pub fn supports(&self, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.is_input,
            Direction::Output => self.is_output,
        }
    }

    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(|d| self.supports(*d))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>2}. {} [{}] [{}]",
            self.priority,
            self.name,
            if self.is_enabled { "Enabled" } else { "Disabled" },
            if self.is_currently_connected {
                "Online"
            } else {
                "Offline"
            }
        )?;
        if let Some(shortcut) = &self.keyboard_shortcut {
            write!(f, " {}", shortcut)?;
        }
        Ok(())
    }
}
