//! Platform extraction from raw page geometry.
//!
//! A platform is the top edge of a visible content element, expressed in document
//! coordinates. Scans are pure functions of the element boxes and the viewport, so
//! hosts only need to report what layout already knows.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{SpiderConfig, Viewport};

/// Two platforms whose surfaces differ by at most this many px share a row.
pub const ROW_EPSILON: f64 = 2.0;
/// Horizontal gap in px bridged when merging platforms on the same row.
pub const MERGE_GAP: f64 = 8.0;
/// Elements at or below this opacity are treated as invisible.
pub const MIN_OPACITY: f64 = 0.02;

/// Opaque handle for the page element a platform came from (debug rendering only).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ElementKey(pub u32);

/// Layout facts for one candidate element, as read from the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ElementBox {
    pub key: ElementKey,
    /// Left edge in client (viewport) coordinates.
    pub left: f64,
    /// Top edge in client (viewport) coordinates.
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f64,
    /// `position: fixed` elements move with the viewport, not the document.
    pub position_fixed: bool,
    /// The element lives inside the effect's own overlay layer.
    pub in_overlay: bool,
}

impl ElementBox {
    /// A plain visible, in-flow element with the given client rect.
    #[must_use]
    pub const fn visible(key: u32, left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            key: ElementKey(key),
            left,
            top,
            width,
            height,
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
            position_fixed: false,
            in_overlay: false,
        }
    }

    fn is_usable(&self, min_width: f64, min_height: f64) -> bool {
        if self.in_overlay {
            return false;
        }
        if self.display_none || self.visibility_hidden || self.opacity <= MIN_OPACITY {
            return false;
        }
        if self.position_fixed {
            return false;
        }
        self.width >= min_width && self.height >= min_height
    }
}

/// A horizontal ledge spiders can stand on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Platform {
    pub x1: f64,
    pub x2: f64,
    /// Surface height; a grounded spider's foot rests here.
    pub y: f64,
    pub source: ElementKey,
}

impl Platform {
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Whether `x` lies within the platform's horizontal span (inclusive).
    #[must_use]
    pub fn spans(&self, x: f64) -> bool {
        x >= self.x1 && x <= self.x2
    }
}

/// Scan element boxes into an ordered, merged platform list.
///
/// Output is sorted top-to-bottom then left-to-right, so the first entries are the
/// topmost ledges on the page.
#[must_use]
pub fn scan_platforms(
    elements: &[ElementBox],
    viewport: &Viewport,
    config: &SpiderConfig,
) -> Vec<Platform> {
    let min_width = config.platform_min_width;
    let min_height = config.platform_min_height;
    let mut candidates = Vec::new();
    for element in elements {
        if !element.is_usable(min_width, min_height) {
            continue;
        }
        let x1 = element.left + viewport.scroll_x;
        let x2 = element.left + element.width + viewport.scroll_x;
        let y = element.top + viewport.scroll_y - config.platform_offset_y;
        if x2 - x1 < min_width {
            continue;
        }
        candidates.push(Platform {
            x1,
            x2,
            y,
            source: element.key,
        });
        if candidates.len() >= config.max_platforms {
            break;
        }
    }
    merge_platforms(candidates)
}

/// Sort platforms by `(y, x1)` and merge same-row segments that touch or overlap.
///
/// A merged platform keeps the first-seen surface height and source element.
/// Merging an already merged list returns it unchanged.
#[must_use]
pub fn merge_platforms(mut platforms: Vec<Platform>) -> Vec<Platform> {
    platforms.sort_by_key(|p| (OrderedFloat(p.y), OrderedFloat(p.x1)));
    let mut merged: Vec<Platform> = Vec::with_capacity(platforms.len());
    for platform in platforms {
        if let Some(last) = merged.last_mut()
            && (platform.y - last.y).abs() <= ROW_EPSILON
            && platform.x1 <= last.x2 + MERGE_GAP
        {
            last.x2 = last.x2.max(platform.x2);
            continue;
        }
        merged.push(platform);
    }
    merged
}

/// Handle to a platform inside a specific [`PlatformSet`] generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformRef {
    pub epoch: u64,
    pub index: usize,
}

/// The current platform collection. Each rescan replaces it wholesale and bumps the epoch,
/// which invalidates every outstanding [`PlatformRef`].
#[derive(Debug, Clone, Default)]
pub struct PlatformSet {
    epoch: u64,
    platforms: Vec<Platform>,
}

impl PlatformSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly scanned collection.
    pub fn replace(&mut self, platforms: Vec<Platform>) {
        self.epoch += 1;
        self.platforms = platforms;
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Platform] {
        &self.platforms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Reference the platform at `index` in the current generation.
    #[must_use]
    pub fn reference(&self, index: usize) -> Option<PlatformRef> {
        (index < self.platforms.len()).then_some(PlatformRef {
            epoch: self.epoch,
            index,
        })
    }

    /// Resolve a reference, returning `None` when it predates the latest rescan.
    #[must_use]
    pub fn resolve(&self, platform: PlatformRef) -> Option<&Platform> {
        if platform.epoch != self.epoch {
            return None;
        }
        self.platforms.get(platform.index)
    }

    /// Indices of the topmost row: every platform within `epsilon` of the smallest `y`.
    #[must_use]
    pub fn top_cluster(&self, epsilon: f64) -> Vec<usize> {
        let Some(first) = self.platforms.first() else {
            return Vec::new();
        };
        let min_y = first.y;
        self.platforms
            .iter()
            .take_while(|p| p.y <= min_y + epsilon)
            .enumerate()
            .map(|(idx, _)| idx)
            .collect()
    }
}
