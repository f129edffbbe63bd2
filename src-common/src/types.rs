//! Shared types for picker presentation and event loop state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// How the application presents itself while the event loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPolicy {
    /// Ordinary app with a Dock icon and menu bar
    Regular,
    /// No Dock icon, but may show windows (pickers, panels)
    Accessory,
    /// May not create windows or be activated
    #[default]
    Prohibited,
}

impl ActivationPolicy {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Accessory => "accessory",
            Self::Prohibited => "prohibited",
        }
    }
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitfield of the selection modes a picker offers.
///
/// Bit values match `SCContentSharingPickerMode`. Combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PickerMode(u32);

impl PickerMode {
    pub const SINGLE_WINDOW: Self = Self(1 << 0);
    pub const MULTIPLE_WINDOWS: Self = Self(1 << 1);
    pub const SINGLE_APPLICATION: Self = Self(1 << 2);
    pub const MULTIPLE_APPLICATIONS: Self = Self(1 << 3);
    pub const SINGLE_DISPLAY: Self = Self(1 << 4);

    /// Every mode with its canonical name, in bit order.
    pub const ALL: [(Self, &'static str); 5] = [
        (Self::SINGLE_WINDOW, "singleWindow"),
        (Self::MULTIPLE_WINDOWS, "multipleWindows"),
        (Self::SINGLE_APPLICATION, "singleApplication"),
        (Self::MULTIPLE_APPLICATIONS, "multipleApplications"),
        (Self::SINGLE_DISPLAY, "singleDisplay"),
    ];

    /// No explicit modes; the platform picks its defaults.
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits, dropping bits that name no mode.
    pub fn from_bits_truncate(bits: u32) -> Self {
        let known = Self::ALL.iter().fold(0, |acc, (mode, _)| acc | mode.0);
        Self(bits & known)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Look up a single mode by name.
    ///
    /// Accepts the canonical camelCase names as well as kebab/snake case
    /// (`single-window`, `single_window`).
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .iter()
            .find(|(_, canonical)| canonical.to_lowercase() == wanted)
            .map(|(mode, _)| *mode)
    }

    /// Canonical names of the modes set in this bitfield.
    pub fn names(self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|(mode, _)| self.contains(*mode))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for PickerMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PickerMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TryFrom<Vec<String>> for PickerMode {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        names.iter().try_fold(Self::empty(), |acc, name| {
            Self::from_name(name)
                .map(|mode| acc | mode)
                .ok_or_else(|| format!("unknown picker mode: {}", name))
        })
    }
}

impl From<PickerMode> for Vec<String> {
    fn from(mode: PickerMode) -> Self {
        mode.names().into_iter().map(str::to_string).collect()
    }
}

impl fmt::Display for PickerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("default");
        }
        f.write_str(&self.names().join(" | "))
    }
}

/// Configuration applied to the picker before it is presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PickerConfiguration {
    /// Selection modes offered to the user; empty means platform defaults.
    pub allowed_picker_modes: PickerMode,
    /// Window IDs that never appear in the picker.
    pub excluded_window_ids: Vec<u32>,
    /// Bundle identifiers whose windows never appear in the picker.
    pub excluded_bundle_ids: Vec<String>,
    /// Whether the user may change the selection after picking.
    pub allows_changing_selected_content: bool,
}

/// Kind of content a selection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Display,
    Window,
    Application,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Display => "display",
            SourceKind::Window => "window",
            SourceKind::Application => "application",
        }
    }
}

/// Content chosen in a picker that has no native filter object.
///
/// Textual form is `<kind>:<id>`, e.g. `display:1`, `window:8812`,
/// `application:com.apple.Safari`. `screen` and `app` are accepted aliases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentSelection {
    pub kind: SourceKind,
    pub id: String,
}

impl ContentSelection {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl FromStr for ContentSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<id>, got {:?}", s))?;
        let kind = match kind.to_lowercase().as_str() {
            "display" | "screen" => SourceKind::Display,
            "window" => SourceKind::Window,
            "application" | "app" => SourceKind::Application,
            other => return Err(format!("unknown source kind: {}", other)),
        };
        let id = id.trim();
        if id.is_empty() {
            return Err("selection id is empty".to_string());
        }
        Ok(Self::new(kind, id))
    }
}

impl fmt::Display for ContentSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Phase of the process-wide event loop lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    /// Nobody owns the loop
    Idle,
    /// An owner installed its delegate and is waiting for the loop to launch
    Starting,
    /// The loop is running on behalf of an owner
    Running,
    /// Stop was requested; the loop is winding down
    Stopping,
}

/// Snapshot of the bridge's view of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStatus {
    /// Whether the platform reports the loop as running
    pub loop_running: bool,
    /// Lease phase
    pub phase: LoopPhase,
    /// DirectRun tasks currently scheduled on an owned loop
    pub guests: usize,
    /// Current activation policy
    pub activation_policy: ActivationPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picker_mode_bits_match_platform() {
        assert_eq!(PickerMode::SINGLE_WINDOW.bits(), 1);
        assert_eq!(PickerMode::MULTIPLE_WINDOWS.bits(), 2);
        assert_eq!(PickerMode::SINGLE_APPLICATION.bits(), 4);
        assert_eq!(PickerMode::MULTIPLE_APPLICATIONS.bits(), 8);
        assert_eq!(PickerMode::SINGLE_DISPLAY.bits(), 16);
    }

    #[test]
    fn test_picker_mode_from_name() {
        assert_eq!(PickerMode::from_name("singleWindow"), Some(PickerMode::SINGLE_WINDOW));
        assert_eq!(PickerMode::from_name("single-display"), Some(PickerMode::SINGLE_DISPLAY));
        assert_eq!(
            PickerMode::from_name("MULTIPLE_APPLICATIONS"),
            Some(PickerMode::MULTIPLE_APPLICATIONS)
        );
        assert_eq!(PickerMode::from_name("everything"), None);
    }

    #[test]
    fn test_picker_mode_truncates_unknown_bits() {
        let mode = PickerMode::from_bits_truncate(0b1_0001 | 1 << 9);
        assert_eq!(mode, PickerMode::SINGLE_WINDOW | PickerMode::SINGLE_DISPLAY);
    }

    #[test]
    fn test_picker_mode_serializes_by_name() {
        let mode = PickerMode::SINGLE_WINDOW | PickerMode::SINGLE_DISPLAY;
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, r#"["singleWindow","singleDisplay"]"#);

        let err = serde_json::from_str::<PickerMode>(r#"["singleWindow","bogus"]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_picker_configuration_partial_json() {
        // Callers usually pass only the fields they care about
        let json = r#"{"excludedBundleIds": ["com.apple.finder"]}"#;
        let config: PickerConfiguration = serde_json::from_str(json).unwrap();
        assert!(config.allowed_picker_modes.is_empty());
        assert_eq!(config.excluded_bundle_ids, vec!["com.apple.finder".to_string()]);
        assert!(config.excluded_window_ids.is_empty());
        assert!(!config.allows_changing_selected_content);
    }

    #[test]
    fn test_picker_configuration_roundtrip_keys() {
        let config = PickerConfiguration {
            allowed_picker_modes: PickerMode::SINGLE_DISPLAY,
            excluded_window_ids: vec![42],
            excluded_bundle_ids: vec![],
            allows_changing_selected_content: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"allowedPickerModes\":[\"singleDisplay\"]"));
        assert!(json.contains("\"excludedWindowIds\":[42]"));
        assert!(json.contains("\"allowsChangingSelectedContent\":true"));
    }

    #[test]
    fn test_content_selection_parse() {
        let sel: ContentSelection = "screen:1".parse().unwrap();
        assert_eq!(sel, ContentSelection::new(SourceKind::Display, "1"));
        assert_eq!(sel.to_string(), "display:1");

        let sel: ContentSelection = " app:com.apple.Safari ".parse().unwrap();
        assert_eq!(sel.kind, SourceKind::Application);
        assert_eq!(sel.id, "com.apple.Safari");

        assert!("window:".parse::<ContentSelection>().is_err());
        assert!("monitor:1".parse::<ContentSelection>().is_err());
        assert!("8812".parse::<ContentSelection>().is_err());
    }

    #[test]
    fn test_activation_policy_as_str() {
        assert_eq!(ActivationPolicy::Regular.as_str(), "regular");
        assert_eq!(ActivationPolicy::Accessory.to_string(), "accessory");
        assert_eq!(ActivationPolicy::default(), ActivationPolicy::Prohibited);
    }
}
