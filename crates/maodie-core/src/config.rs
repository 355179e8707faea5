//! Tunables for the effect.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a configuration cannot drive a world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Static configuration for a spider world. Read-only once the world is built.
///
/// Field names serialize in camelCase so browser-side option objects
/// (`{ scaleMin: 0.2, debug: true }`) deserialize without a mapping layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SpiderConfig {
    /// Target population.
    pub count: usize,
    /// Smallest per-spider scale factor.
    pub scale_min: f64,
    /// Largest per-spider scale factor.
    pub scale_max: f64,
    /// Natural sprite width in px before scaling.
    pub sprite_width: f64,
    /// Natural sprite height in px before scaling.
    pub sprite_height: f64,
    /// Slowest cruise speed in px/s.
    pub speed_min: f64,
    /// Fastest cruise speed in px/s.
    pub speed_max: f64,
    /// Multiplier applied to cruise speed while scared.
    pub scare_speed_multiplier: f64,
    /// Smallest upward launch speed in px/s.
    pub jump_speed_min: f64,
    /// Largest upward launch speed in px/s.
    pub jump_speed_max: f64,
    /// Downward acceleration in px/s².
    pub gravity: f64,
    /// Approximate per-second probability of a walking spider pausing.
    pub idle_chance: f64,
    /// Shortest pause in seconds.
    pub idle_min: f64,
    /// Longest pause in seconds.
    pub idle_max: f64,
    /// Pointer distance in px that scares a spider.
    pub scare_radius: f64,
    /// Offset subtracted from an element's top edge to place its platform.
    pub platform_offset_y: f64,
    /// Narrowest element (and platform) considered walkable.
    pub platform_min_width: f64,
    /// Shortest element considered walkable.
    pub platform_min_height: f64,
    /// Cap on the number of scanned platforms.
    pub max_platforms: usize,
    /// Draw platform outlines.
    pub debug: bool,
    /// Stacking order of the overlay layer (presentation only).
    pub z_index: i32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            count: 9,
            scale_min: 0.15,
            scale_max: 0.25,
            sprite_width: 282.0,
            sprite_height: 97.0,
            speed_min: 55.0,
            speed_max: 95.0,
            scare_speed_multiplier: 2.2,
            jump_speed_min: 420.0,
            jump_speed_max: 560.0,
            gravity: 2600.0,
            idle_chance: 0.14,
            idle_min: 0.6,
            idle_max: 2.0,
            scare_radius: 140.0,
            platform_offset_y: 1.0,
            platform_min_width: 80.0,
            platform_min_height: 16.0,
            max_platforms: 600,
            debug: false,
            z_index: 2_147_481_000,
            rng_seed: None,
        }
    }
}

impl SpiderConfig {
    /// Check that every range is ordered and every magnitude is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            self.scale_min,
            self.scale_max,
            self.sprite_width,
            self.sprite_height,
            self.speed_min,
            self.speed_max,
            self.scare_speed_multiplier,
            self.jump_speed_min,
            self.jump_speed_max,
            self.gravity,
            self.idle_chance,
            self.idle_min,
            self.idle_max,
            self.scare_radius,
            self.platform_offset_y,
            self.platform_min_width,
            self.platform_min_height,
        ];
        if finite.iter().any(|value| !value.is_finite()) {
            return Err(ConfigError::Invalid("all numeric options must be finite"));
        }
        if self.scale_min <= 0.0 || self.scale_min > self.scale_max {
            return Err(ConfigError::Invalid(
                "scale range must be positive with scale_min <= scale_max",
            ));
        }
        if self.sprite_width <= 0.0 || self.sprite_height <= 0.0 {
            return Err(ConfigError::Invalid("sprite dimensions must be positive"));
        }
        if self.speed_min < 0.0 || self.speed_min > self.speed_max {
            return Err(ConfigError::Invalid(
                "speed range must be non-negative with speed_min <= speed_max",
            ));
        }
        if self.jump_speed_min < 0.0 || self.jump_speed_min > self.jump_speed_max {
            return Err(ConfigError::Invalid(
                "jump speed range must be non-negative with jump_speed_min <= jump_speed_max",
            ));
        }
        if self.idle_min < 0.0 || self.idle_min > self.idle_max {
            return Err(ConfigError::Invalid(
                "idle range must be non-negative with idle_min <= idle_max",
            ));
        }
        if self.gravity < 0.0
            || self.idle_chance < 0.0
            || self.scare_radius < 0.0
            || self.scare_speed_multiplier < 0.0
        {
            return Err(ConfigError::Invalid(
                "gravity, idle chance, scare radius, and scare multiplier must be non-negative",
            ));
        }
        if self.platform_min_width < 0.0 || self.platform_min_height < 0.0 {
            return Err(ConfigError::Invalid(
                "platform minimum dimensions must be non-negative",
            ));
        }
        if self.max_platforms == 0 {
            return Err(ConfigError::Invalid("max_platforms must be non-zero"));
        }
        Ok(())
    }

    /// Returns an RNG from the configured seed, falling back to entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.rng_seed.unwrap_or_else(entropy_seed))
    }
}

#[cfg(feature = "entropy")]
fn entropy_seed() -> u64 {
    rand::random()
}

/// Without OS entropy every unseeded world shares one fixed seed; embedders pass their own.
#[cfg(not(feature = "entropy"))]
fn entropy_seed() -> u64 {
    0x6D61_6F64_6965_0001
}
