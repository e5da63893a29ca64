use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::audio::{Device, Direction};
use crate::config::Config;

/// Trait for sending notifications - allows for testing without system calls
pub trait NotificationSender {
    fn send(&self, title: &str, subtitle: &str, body: &str) -> Result<()>;
}

/// Production notification sender using macOS osascript
pub struct MacOSNotificationSender;

impl NotificationSender for MacOSNotificationSender {
    fn send(&self, title: &str, subtitle: &str, body: &str) -> Result<()> {
        send_native_macos_notification(title, subtitle, body)
    }
}

/// Fallback for platforms without a notification center: the log is the sink
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, title: &str, subtitle: &str, body: &str) -> Result<()> {
        info!(title, subtitle, "{}", body);
        Ok(())
    }
}

/// A sent notification as recorded by [`TestNotificationSender`]
#[cfg(any(test, feature = "test-mocks"))]
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub title: String,
    pub subtitle: String,
    pub body: String,
}

/// Test notification sender that records instead of displaying.
/// Clones share the same record.
#[cfg(any(test, feature = "test-mocks"))]
#[derive(Clone, Default)]
pub struct TestNotificationSender {
    pub sent_notifications: std::sync::Arc<std::sync::Mutex<Vec<SentNotification>>>,
}

#[cfg(any(test, feature = "test-mocks"))]
impl TestNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_sent_notifications(&self) -> Vec<SentNotification> {
        self.sent_notifications.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.get_sent_notifications()
            .into_iter()
            .map(|n| n.title)
            .collect()
    }

    pub fn clear(&self) {
        self.sent_notifications.lock().unwrap().clear();
    }
}

#[cfg(any(test, feature = "test-mocks"))]
impl NotificationSender for TestNotificationSender {
    fn send(&self, title: &str, subtitle: &str, body: &str) -> Result<()> {
        debug!("Test notification: {} / {} - {}", title, subtitle, body);
        self.sent_notifications
            .lock()
            .unwrap()
            .push(SentNotification {
                title: title.to_string(),
                subtitle: subtitle.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

/// Reasons for device switching (for notification context)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    HigherPriority,      // A higher priority device became available
    PreviousUnavailable, // Previous device became unavailable or was disabled
    Manual,              // User picked the device
}

type BoxedSender = Box<dyn NotificationSender + Send>;

/// Manages user notifications for device events. Each category is gated by
/// its own config flag; send failures are logged and never propagate into
/// switching decisions.
pub struct NotificationManager {
    show_device_availability: bool,
    show_switching_actions: bool,
    show_shortcut_triggers: bool,
    sender: BoxedSender,
}

impl NotificationManager {
    pub fn new(config: &Config) -> Self {
        Self::with_boxed_sender(config, platform_sender())
    }

    pub fn with_sender(config: &Config, sender: impl NotificationSender + Send + 'static) -> Self {
        Self::with_boxed_sender(config, Box::new(sender))
    }

    fn with_boxed_sender(config: &Config, sender: BoxedSender) -> Self {
        Self {
            show_device_availability: config.notifications.show_device_availability,
            show_switching_actions: config.notifications.show_switching_actions,
            show_shortcut_triggers: config.notifications.show_shortcut_triggers,
            sender,
        }
    }

    /// Pick up changed notification flags after a config reload
    pub fn apply_config(&mut self, config: &Config) {
        self.show_device_availability = config.notifications.show_device_availability;
        self.show_switching_actions = config.notifications.show_switching_actions;
        self.show_shortcut_triggers = config.notifications.show_shortcut_triggers;
    }

    /// Send notification when a device comes online
    pub fn device_connected(&self, device: &Device) {
        if !self.show_device_availability {
            return;
        }

        let body = format!("{} {} is now available", device_icon(device), device.name);
        self.send_notification("Audio Device Connected", "", &body);
    }

    /// Send notification when a device goes offline
    pub fn device_disconnected(&self, device: &Device) {
        if !self.show_device_availability {
            return;
        }

        let body = format!(
            "{} {} is no longer available",
            device_icon(device),
            device.name
        );
        self.send_notification("Audio Device Disconnected", "", &body);
    }

    /// Send notification when the default device changes
    pub fn device_switched(&self, direction: Direction, device_name: &str, reason: SwitchReason) {
        if !self.show_switching_actions {
            return;
        }

        let kind = match direction {
            Direction::Input => "🎤 Input",
            Direction::Output => "🔊 Output",
        };

        let body = match reason {
            SwitchReason::HigherPriority => {
                format!("{} switched to {} (higher priority)", kind, device_name)
            }
            SwitchReason::PreviousUnavailable => {
                format!(
                    "{} switched to {} (previous device unavailable)",
                    kind, device_name
                )
            }
            SwitchReason::Manual => format!("{} manually switched to {}", kind, device_name),
        };

        self.send_notification("Audio Device Switched", direction.as_str(), &body);
    }

    /// Send notification when switching fails
    pub fn switch_failed(&self, device_name: &str, error: &str) {
        if !self.show_switching_actions {
            return;
        }

        let body = format!("Failed to switch to {device_name}: {error}");
        self.send_notification("Audio Device Switch Failed", "", &body);
        warn!("Sent switch failed notification for: {}", device_name);
    }

    /// Confirmation for a shortcut-triggered switch
    pub fn shortcut_triggered(&self, title: &str, subtitle: &str) {
        if !self.show_shortcut_triggers {
            return;
        }

        self.send_notification(title, subtitle, "");
    }

    fn send_notification(&self, title: &str, subtitle: &str, body: &str) {
        debug!("Sending notification: {} - {}", title, body);

        if let Err(e) = self.sender.send(title, subtitle, body) {
            error!("Failed to send notification '{}': {:#}", title, e);
        }
    }
}

fn device_icon(device: &Device) -> &'static str {
    match (device.is_input, device.is_output) {
        (true, true) => "🎧",
        (true, false) => "🎤",
        _ => "🔊",
    }
}

fn platform_sender() -> BoxedSender {
    if cfg!(target_os = "macos") {
        Box::new(MacOSNotificationSender)
    } else {
        Box::new(LogNotificationSender)
    }
}

/// Send notification using native macOS osascript (more reliable for unsigned apps)
fn send_native_macos_notification(title: &str, subtitle: &str, body: &str) -> Result<()> {
    use std::process::Command;

    let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
    let script = format!(
        r#"display notification "{}" with title "{}" subtitle "{}""#,
        escape(body),
        escape(title),
        escape(subtitle)
    );

    let output = Command::new("osascript").args(["-e", &script]).output()?;

    if output.status.success() {
        Ok(())
    } else {
        let error = String::from_utf8_lossy(&output.stderr);
        Err(anyhow::anyhow!("osascript failed: {}", error))
    }
}
