//! Core simulation for the maodie screen effect.
//!
//! Spiders roam over the visible content of a host document, treating block-level
//! elements as platforms. This crate owns everything that does not touch the DOM:
//! platform extraction from raw element geometry, the per-spider state machine and
//! physics integrator, and the [`World`] that keeps a steady population alive.
//! Hosts plug in through the [`PageLayout`] and [`Presenter`] traits.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod host;
pub mod platform;
pub mod spider;
pub mod timers;
pub mod world;

pub use config::{ConfigError, SpiderConfig};
pub use host::{
    NullPresenter, PageLayout, Presenter, PresenterEvent, RecordingPresenter, StaticLayout,
};
pub use platform::{
    ElementBox, ElementKey, Platform, PlatformRef, PlatformSet, merge_platforms, scan_platforms,
};
pub use spider::{Behavior, Footing, RemovalReason, Spider, StepContext, Transform, Velocity};
pub use timers::{TimerKind, TimerWheel};
pub use world::{MAX_STEP_SECONDS, SpiderId, World, WorldError};

/// Crate version reported by the public control surface.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Point in document coordinates (CSS pixels, origin at the top-left of the page).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Scroll position and extents of the host document at one instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    /// Inner width of the visible window.
    pub width: f64,
    /// Inner height of the visible window.
    pub height: f64,
    /// `max(scroll width, client width)` of the document element.
    pub document_width: f64,
    /// `max(scroll height, client height)` of the document element.
    pub document_height: f64,
}

impl Viewport {
    /// A viewport showing the whole of a `width` x `height` page without scrolling.
    #[must_use]
    pub const fn unscrolled(width: f64, height: f64) -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width,
            height,
            document_width: width,
            document_height: height,
        }
    }

    /// Convert a client-space (viewport-relative) point into document space.
    #[must_use]
    pub fn to_document(&self, client_x: f64, client_y: f64) -> Point {
        Point::new(client_x + self.scroll_x, client_y + self.scroll_y)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::unscrolled(1280.0, 800.0)
    }
}

pub(crate) fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Uniform sample in `[min, max)`, collapsing to `min` when the range is empty.
pub(crate) fn sample_range(rng: &mut impl Rng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.random_range(min..max)
    } else {
        min
    }
}

/// Random facing: `-1.0` (left) or `1.0` (right) with equal odds.
pub(crate) fn random_sign(rng: &mut impl Rng) -> f64 {
    if rng.random_bool(0.5) { -1.0 } else { 1.0 }
}
