//! Per-run generator tunables and the process-wide defaults they start from.

use crate::constants::*;
use crate::geometry::Bounds;
use crate::template::RepeatMode;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Full generation attempts before the run is declared failed.
    pub max_attempts: u32,
    /// Upper bound on doorway pairs tested per tile slot.
    pub max_pairing_attempts: Option<usize>,
    pub backtrack_min_placed: usize,
    pub max_local_retries: u32,
    pub max_total_local_retries: u32,
    pub up_axis: Vec3,
    /// Shrink applied to tile bounds before collision tests.
    pub overlap_threshold: f32,
    /// Growth applied to tile bounds before collision tests.
    pub padding: f32,
    /// Hard limits every tile must stay inside.
    pub placement_bounds: Option<Bounds>,
    pub length_multiplier: f32,
    pub repeat_mode_override: Option<RepeatMode>,
    pub allow_rotation_override: Option<bool>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_pairing_attempts: None,
            backtrack_min_placed: DEFAULT_BACKTRACK_MIN_PLACED,
            max_local_retries: DEFAULT_MAX_LOCAL_RETRIES,
            max_total_local_retries: DEFAULT_MAX_TOTAL_LOCAL_RETRIES,
            up_axis: Vec3::Y,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            padding: 0.0,
            placement_bounds: None,
            length_multiplier: 1.0,
            repeat_mode_override: None,
            allow_rotation_override: None,
        }
    }
}

static DEFAULT_SETTINGS: OnceLock<GeneratorSettings> = OnceLock::new();

/// Install process-wide defaults. Only the first call wins; later calls hand
/// the rejected settings back.
pub fn install_default_settings(settings: GeneratorSettings) -> Result<(), GeneratorSettings> {
    DEFAULT_SETTINGS.set(settings)
}

/// Process-wide defaults, falling back to `GeneratorSettings::default()`.
pub fn default_settings() -> &'static GeneratorSettings {
    DEFAULT_SETTINGS.get_or_init(GeneratorSettings::default)
}
