//! Engine configuration
//!
//! Thresholds and defaults for the tools, the persistence mapping, the page
//! viewport cache and text anchoring. Every field has a default so a host can
//! supply a partial JSON document (or none at all).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Top-level configuration for an annotation session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tools: ToolConfig,
    pub persistence: PersistenceConfig,
    pub cache: CacheConfig,
    pub anchor: AnchorConfig,
}

/// Tool thresholds (pixels unless stated otherwise)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Minimum drag distance before a shape or move gesture commits
    pub min_drag_distance: f64,

    /// Minimum samples for an ink stroke to be kept
    pub min_ink_points: usize,

    /// Minimum vertices for a lasso to select anything
    pub min_lasso_points: usize,

    /// Catmull-Rom tension used to smooth ink strokes
    pub smoothing_tension: f64,

    /// Interpolated points generated per ink segment
    pub smoothing_segments: usize,

    /// Eraser cursor radius
    pub eraser_radius: f64,

    /// Slack around annotation bounds when hit-testing clicks
    pub hit_tolerance: f64,

    /// Longest side of a newly placed stamp, in document units
    pub stamp_max_size: f64,

    /// Side of a newly placed note icon, in document units
    pub default_note_size: f64,

    /// Ask before single and lasso deletes
    pub confirm_destructive: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            min_drag_distance: 5.0,
            min_ink_points: 3,
            min_lasso_points: 3,
            smoothing_tension: crate::geometry::DEFAULT_TENSION,
            smoothing_segments: crate::geometry::SMOOTHING_SEGMENTS,
            eraser_radius: 20.0,
            hit_tolerance: 4.0,
            stamp_max_size: 200.0,
            default_note_size: crate::annotation::NOTE_ICON_SIZE,
            confirm_destructive: true,
        }
    }
}

/// How colors are written to wire records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    /// `"#rrggbb"`
    #[default]
    Hex,

    /// `[r, g, b]` fractions in `[0, 1]`
    Normalized,
}

/// Wire mapping settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub color_format: ColorFormat,

    /// Written to `user_id` on every record
    pub user_id: Option<String>,

    /// Stamped into the metadata of annotations created in this session
    pub author_name: Option<String>,
}

/// Page viewport cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Pages kept on each side of the current page
    pub page_window: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { page_window: 3 }
    }
}

/// Text anchoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Context captured on each side of a selection
    pub context_chars: usize,

    /// Maximum corner distance for two quad lists to be considered equal
    pub quad_tolerance: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            context_chars: crate::anchor::DEFAULT_CONTEXT_CHARS,
            quad_tolerance: 0.5,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; absent fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config = Self::from_json_str(&json)?;
                tracing::info!(path = %path.display(), "loaded engine config");
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no engine config, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
