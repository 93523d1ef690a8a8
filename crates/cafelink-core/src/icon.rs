//! Toolbar icon paths for each status.

use serde::Serialize;

use crate::status::TriState;

/// Icon sizes shipped for every status.
pub const ICON_SIZES: [u32; 4] = [16, 32, 48, 128];

/// Directory the icon images live in.
const ICON_DIR: &str = "/images";

/// One icon image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconPath {
    /// Edge length in pixels.
    pub size: u32,
    /// Extension-relative path.
    pub path: String,
}

/// The full set of icon images for a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconSet {
    pub status: TriState,
    pub paths: Vec<IconPath>,
}

impl IconSet {
    /// Builds the icon set for a status.
    pub fn for_status(status: TriState) -> Self {
        let prefix = icon_prefix(status);
        let paths = ICON_SIZES
            .iter()
            .map(|&size| IconPath {
                size,
                path: format!("{ICON_DIR}/{prefix}{size}.png"),
            })
            .collect();

        Self { status, paths }
    }

    /// Returns the path for one size, if shipped.
    pub fn path(&self, size: u32) -> Option<&str> {
        self.paths
            .iter()
            .find(|p| p.size == size)
            .map(|p| p.path.as_str())
    }
}

/// Returns the filename prefix for a status.
pub fn icon_prefix(status: TriState) -> &'static str {
    match status {
        TriState::Disabled => "icon_disabled_",
        TriState::Running => "icon_running_",
        TriState::Enabled => "icon_",
    }
}
