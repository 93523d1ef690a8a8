//! Tri-state enable flag and the running-scan indicator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enable status shared by the agent, relay, and persisted store.
///
/// Encoded as `1`/`2`/`3` on the wire and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TriState {
    /// Link rewriting is off.
    #[default]
    Disabled = 1,

    /// Link rewriting is on and idle.
    Enabled = 2,

    /// Link rewriting is on and at least one scan is in flight.
    Running = 3,
}

/// A status value outside `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status value: {0}")]
pub struct InvalidStatus(pub u8);

impl TriState {
    /// Returns the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Running => "running",
        }
    }

    /// Returns true for `Enabled` and `Running`.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Returns the toggle value a checkbox would produce.
    pub fn from_toggle(checked: bool) -> Self {
        if checked {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl TryFrom<u8> for TriState {
    type Error = InvalidStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Disabled),
            2 => Ok(Self::Enabled),
            3 => Ok(Self::Running),
            other => Err(InvalidStatus(other)),
        }
    }
}

impl From<TriState> for u8 {
    fn from(status: TriState) -> Self {
        status as u8
    }
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TriState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "off" | "1" => Ok(Self::Disabled),
            "enabled" | "on" | "2" => Ok(Self::Enabled),
            "running" | "3" => Ok(Self::Running),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Receives every status change for display.
///
/// Implementations must not block; delivery is fire-and-forget.
pub trait IconSink: Send + Sync {
    /// Shows the given status.
    fn show(&self, status: TriState);
}

/// Icon sink that discards updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIcon;

impl IconSink for NoopIcon {
    fn show(&self, _status: TriState) {}
}

/// What a coarse status change did to the watcher lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Went from disabled to enabled.
    Started,
    /// Went from enabled to disabled.
    Stopped,
    /// Coarse state did not change.
    Unchanged,
}

/// Holds the current status.
///
/// The coarse flag (enabled or not) gates scanning. `Running` is derived from
/// the number of in-flight scans and only drives the icon.
pub struct StatusCell {
    enabled: AtomicBool,
    running: AtomicUsize,
    icon: Arc<dyn IconSink>,
}

impl std::fmt::Debug for StatusCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCell")
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl StatusCell {
    /// Creates a disabled cell reporting to `icon`.
    pub fn new(icon: Arc<dyn IconSink>) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            running: AtomicUsize::new(0),
            icon,
        }
    }

    /// Returns the current status.
    pub fn current(&self) -> TriState {
        if !self.enabled.load(Ordering::SeqCst) {
            TriState::Disabled
        } else if self.running.load(Ordering::SeqCst) > 0 {
            TriState::Running
        } else {
            TriState::Enabled
        }
    }

    /// Returns true unless disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Applies a requested status and notifies the icon.
    pub fn set(&self, status: TriState) -> Transition {
        let was_enabled = self.enabled.swap(status.is_enabled(), Ordering::SeqCst);
        self.icon.show(status);

        match (was_enabled, status.is_enabled()) {
            (false, true) => Transition::Started,
            (true, false) => Transition::Stopped,
            _ => Transition::Unchanged,
        }
    }

    /// Marks a scan as in flight.
    ///
    /// Returns `None` while disabled. The returned guard restores `Enabled`
    /// when the last concurrent scan finishes, however it exits.
    pub fn begin_scan(self: &Arc<Self>) -> Option<ScanGuard> {
        if !self.is_enabled() {
            return None;
        }

        if self.running.fetch_add(1, Ordering::SeqCst) == 0 {
            self.icon.show(TriState::Running);
        }

        Some(ScanGuard {
            cell: Arc::clone(self),
        })
    }
}

/// Keeps the status at `Running` while alive.
#[derive(Debug)]
pub struct ScanGuard {
    cell: Arc<StatusCell>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let remaining = self.cell.running.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.cell.is_enabled() {
            self.cell.icon.show(TriState::Enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingIcon;

    fn cell() -> (Arc<StatusCell>, Arc<RecordingIcon>) {
        let icon = Arc::new(RecordingIcon::default());
        (Arc::new(StatusCell::new(icon.clone())), icon)
    }

    #[test]
    fn default_status_is_disabled() {
        assert_eq!(TriState::default(), TriState::Disabled);
    }

    #[test]
    fn wire_encoding_is_numeric() {
        assert_eq!(serde_json::to_string(&TriState::Enabled).unwrap(), "2");
        let parsed: TriState = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, TriState::Running);
        assert!(serde_json::from_str::<TriState>("7").is_err());
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("on".parse::<TriState>().unwrap(), TriState::Enabled);
        assert_eq!("Disabled".parse::<TriState>().unwrap(), TriState::Disabled);
        assert!("maybe".parse::<TriState>().is_err());
    }

    #[test]
    fn transitions_report_lifecycle_changes() {
        let (cell, icon) = cell();

        assert_eq!(cell.set(TriState::Enabled), Transition::Started);
        assert_eq!(cell.set(TriState::Enabled), Transition::Unchanged);
        assert_eq!(cell.set(TriState::Disabled), Transition::Stopped);
        assert_eq!(cell.set(TriState::Running), Transition::Started);

        // Every call notifies the icon, including the no-op one.
        assert_eq!(icon.shown().len(), 4);
    }

    #[test]
    fn scan_guard_drives_running() {
        let (cell, icon) = cell();
        assert!(cell.begin_scan().is_none());

        cell.set(TriState::Enabled);
        let first = cell.begin_scan().unwrap();
        let second = cell.begin_scan().unwrap();
        assert_eq!(cell.current(), TriState::Running);

        drop(first);
        assert_eq!(cell.current(), TriState::Running);
        drop(second);
        assert_eq!(cell.current(), TriState::Enabled);

        let shown = icon.shown();
        assert_eq!(
            shown,
            vec![TriState::Enabled, TriState::Running, TriState::Enabled]
        );
    }

    #[test]
    fn guard_released_after_disable_does_not_show_enabled() {
        let (cell, icon) = cell();
        cell.set(TriState::Enabled);
        let guard = cell.begin_scan().unwrap();
        cell.set(TriState::Disabled);
        drop(guard);

        assert_eq!(cell.current(), TriState::Disabled);
        assert_eq!(icon.shown().last(), Some(&TriState::Disabled));
    }
}
