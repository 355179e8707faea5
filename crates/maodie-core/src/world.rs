//! Population and lifecycle management.

use std::fmt;

use rand::{Rng, rngs::SmallRng};
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;
use tracing::{debug, info};

use crate::host::{NullPresenter, PageLayout, Presenter};
use crate::platform::{PlatformSet, scan_platforms};
use crate::spider::{RemovalReason, Spider, StepContext};
use crate::timers::{TimerKind, TimerWheel};
use crate::{ConfigError, Point, SpiderConfig};

new_key_type! {
    /// Stable handle for spiders backed by a generational slot map.
    pub struct SpiderId;
}

/// Delay before topping the population back up after a removal.
pub const RESPAWN_DEBOUNCE_MS: f64 = 60.0;
/// Delay before rescanning a page that produced no platforms.
pub const RESCAN_RETRY_MS: f64 = 600.0;
/// Upper bound on a single step, so a throttled tab does not teleport spiders.
pub const MAX_STEP_SECONDS: f64 = 0.05;
/// Platforms within this many px of the topmost one count as "the top".
pub const TOP_CLUSTER_EPSILON: f64 = 4.0;

/// Errors that can occur when constructing a world.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// Owns the platforms, the live spiders, and the simulation clock.
///
/// The embedder drives it: [`World::frame`] once per display refresh,
/// [`World::set_pointer`] on pointer movement, [`World::rescan_platforms`] on resize,
/// [`World::set_visible`] on visibility changes, and [`World::strike`] on clicks.
pub struct World {
    config: SpiderConfig,
    layout: Box<dyn PageLayout>,
    presenter: Box<dyn Presenter>,
    rng: SmallRng,
    platforms: PlatformSet,
    spiders: SlotMap<SpiderId, Spider>,
    pointer: Option<Point>,
    timers: TimerWheel,
    clock: f64,
    last_step: f64,
    active: bool,
    running: bool,
    suppress_respawn: bool,
    next_serial: u64,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("platform_count", &self.platforms.len())
            .field("spider_count", &self.spiders.len())
            .field("active", &self.active)
            .field("running", &self.running)
            .finish()
    }
}

impl World {
    /// Build an inactive world over `layout`, drawing through `presenter`.
    pub fn new(
        config: SpiderConfig,
        layout: Box<dyn PageLayout>,
        presenter: Box<dyn Presenter>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            layout,
            presenter,
            rng,
            platforms: PlatformSet::new(),
            spiders: SlotMap::with_key(),
            pointer: None,
            timers: TimerWheel::new(),
            clock: 0.0,
            last_step: 0.0,
            active: false,
            running: false,
            suppress_respawn: false,
            next_serial: 1,
        })
    }

    /// Build a world that simulates without drawing anything.
    pub fn headless(config: SpiderConfig, layout: Box<dyn PageLayout>) -> Result<Self, WorldError> {
        Self::new(config, layout, Box::new(NullPresenter))
    }

    /// Mount the presenter, scan, populate, and start stepping.
    pub fn activate(&mut self, now: f64) {
        if self.active {
            return;
        }
        info!(count = self.config.count, "activating spider world");
        self.presenter.mount(&self.config);
        self.active = true;
        self.running = true;
        self.clock = now;
        self.last_step = now;
        if self.scan(false) {
            self.ensure_count(false);
        }
    }

    /// Stop stepping, cancel pending timers, and remove every spider without respawning.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        info!(spiders = self.spiders.len(), "deactivating spider world");
        self.timers.cancel_all();
        self.kill_all();
        self.active = false;
        self.running = false;
        self.presenter.unmount();
    }

    /// Clear every spider, rescan, and refill to the target population.
    pub fn reload(&mut self) {
        if !self.active {
            return;
        }
        info!("reloading spider world");
        self.kill_all();
        if self.scan(false) {
            self.ensure_count(false);
        }
    }

    /// Remove every spider immediately. No respawn is scheduled.
    pub fn kill_all(&mut self) {
        self.suppress_respawn = true;
        self.timers.cancel(TimerKind::Respawn);
        let ids: Vec<SpiderId> = self.spiders.keys().collect();
        for id in ids {
            let reason = self
                .spiders
                .get_mut(id)
                .and_then(|spider| spider.destroy(RemovalReason::Cleared));
            if let Some(reason) = reason {
                self.on_spider_removed(id, reason);
            }
        }
        self.suppress_respawn = false;
    }

    /// Re-run the platform scan. An empty initial scan schedules one retry; otherwise the
    /// population is topped up from the top of the page.
    pub fn rescan_platforms(&mut self, from_resize: bool) {
        if !self.active {
            return;
        }
        if self.scan(from_resize) {
            self.ensure_count(true);
        }
    }

    /// Replace the platform set. Returns `false` when a deferred retry was scheduled instead
    /// of an immediate top-up.
    fn scan(&mut self, from_resize: bool) -> bool {
        self.refresh_platforms();
        if self.platforms.is_empty() && !from_resize {
            debug!(retry_in_ms = RESCAN_RETRY_MS, "no platforms found, retrying later");
            self.timers
                .arm(TimerKind::RescanRetry, self.clock + RESCAN_RETRY_MS);
            return false;
        }
        true
    }

    fn refresh_platforms(&mut self) {
        let Some(viewport) = self.layout.viewport() else {
            self.platforms.replace(Vec::new());
            return;
        };
        let scanned = scan_platforms(&self.layout.elements(), &viewport, &self.config);
        self.platforms.replace(scanned);
        debug!(
            platforms = self.platforms.len(),
            epoch = self.platforms.epoch(),
            "platforms rescanned"
        );
        if self.config.debug {
            self.presenter
                .draw_platforms(self.platforms.as_slice(), &viewport);
        }
    }

    /// Spawn spiders until the target population is reached. With `at_top`, spawn on the
    /// topmost row of platforms when one exists.
    pub fn ensure_count(&mut self, at_top: bool) {
        if self.platforms.is_empty() {
            return;
        }
        let missing = self.config.count.saturating_sub(self.spiders.len());
        if missing == 0 {
            return;
        }
        let top = if at_top {
            self.platforms.top_cluster(TOP_CLUSTER_EPSILON)
        } else {
            Vec::new()
        };
        for _ in 0..missing {
            let index = if top.is_empty() {
                self.rng.random_range(0..self.platforms.len())
            } else {
                top[self.rng.random_range(0..top.len())]
            };
            self.spawn_on(index, !top.is_empty());
        }
    }

    fn spawn_on(&mut self, index: usize, pin: bool) -> Option<SpiderId> {
        let serial = self.next_serial;
        let mut spider =
            Spider::spawn(serial, &self.platforms, index, &self.config, &mut self.rng)?;
        self.next_serial += 1;
        if pin {
            spider.ground_on(&self.platforms, index);
        }
        let (width, height) = (spider.width(), spider.height());
        let transform = self
            .layout
            .viewport()
            .map(|viewport| spider.transform(&viewport));
        let id = self.spiders.insert(spider);
        self.presenter.create(id, width, height);
        if let Some(transform) = transform {
            self.presenter.update(id, &transform);
        }
        debug!(serial, platform = index, at_top = pin, "spider spawned");
        Some(id)
    }

    fn on_spider_removed(&mut self, id: SpiderId, reason: RemovalReason) {
        let Some(spider) = self.spiders.remove(id) else {
            return;
        };
        self.presenter.destroy(id);
        debug!(serial = spider.serial(), ?reason, "spider removed");
        if !self.suppress_respawn {
            self.timers
                .arm(TimerKind::Respawn, self.clock + RESPAWN_DEBOUNCE_MS);
        }
    }

    /// One display refresh: fire due timers, then step every spider unless paused.
    pub fn frame(&mut self, now: f64) {
        if !self.active {
            return;
        }
        self.poll_timers(now);
        self.step_all(now);
    }

    /// Fire any deferred respawn or rescan whose deadline has passed.
    pub fn poll_timers(&mut self, now: f64) {
        if !self.active {
            return;
        }
        self.clock = self.clock.max(now);
        for kind in self.timers.take_due(now) {
            debug!(?kind, "timer fired");
            match kind {
                TimerKind::Respawn => self.ensure_count(true),
                TimerKind::RescanRetry => {
                    self.refresh_platforms();
                    self.ensure_count(true);
                }
            }
        }
    }

    /// Advance every spider by the time elapsed since the previous step.
    ///
    /// Does nothing while inactive or hidden.
    pub fn step_all(&mut self, now: f64) {
        if !self.active || !self.running {
            return;
        }
        let dt = ((now - self.last_step) / 1000.0).clamp(0.0, MAX_STEP_SECONDS);
        self.last_step = now;
        self.clock = self.clock.max(now);
        let Some(viewport) = self.layout.viewport() else {
            return;
        };

        let ctx = StepContext {
            now,
            dt,
            pointer: self.pointer,
            platforms: &self.platforms,
            viewport: &viewport,
            config: &self.config,
        };
        let mut removed = Vec::new();
        for (id, spider) in &mut self.spiders {
            match spider.update(&ctx, &mut self.rng) {
                Some(reason) => removed.push((id, reason)),
                None => self.presenter.update(id, &spider.transform(&viewport)),
            }
        }
        for (id, reason) in removed {
            self.on_spider_removed(id, reason);
        }

        if self.config.debug {
            self.presenter
                .draw_platforms(self.platforms.as_slice(), &viewport);
        }
    }

    /// Pause stepping while hidden; on return, reset the baseline so no catch-up step occurs.
    pub fn set_visible(&mut self, visible: bool, now: f64) {
        if !self.active {
            return;
        }
        if !visible {
            self.running = false;
        } else if !self.running {
            self.last_step = now;
            self.running = true;
        }
    }

    /// Latest pointer position in document space, or `None` to forget it.
    pub fn set_pointer(&mut self, pointer: Option<Point>) {
        self.pointer = pointer;
    }

    /// Click on a spider: start its roll-off. Returns `false` for unknown or already
    /// rolling spiders.
    pub fn strike(&mut self, id: SpiderId) -> bool {
        if !self.active {
            return false;
        }
        let Some(spider) = self.spiders.get_mut(id) else {
            return false;
        };
        if !spider.roll_off(&mut self.rng) {
            return false;
        }
        debug!(serial = spider.serial(), "spider struck");
        if let Some(viewport) = self.layout.viewport() {
            self.presenter.update(id, &spider.transform(&viewport));
        }
        true
    }

    #[must_use]
    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    #[must_use]
    pub fn platforms(&self) -> &PlatformSet {
        &self.platforms
    }

    #[must_use]
    pub fn spider_count(&self) -> usize {
        self.spiders.len()
    }

    /// Iterate over live spiders.
    pub fn spiders(&self) -> impl Iterator<Item = (SpiderId, &Spider)> {
        self.spiders.iter()
    }

    #[must_use]
    pub fn spider(&self, id: SpiderId) -> Option<&Spider> {
        self.spiders.get(id)
    }

    /// Mutable access to a live spider (placement by embedders and tests).
    #[must_use]
    pub fn spider_mut(&mut self, id: SpiderId) -> Option<&mut Spider> {
        self.spiders.get_mut(id)
    }

    #[must_use]
    pub fn pointer(&self) -> Option<Point> {
        self.pointer
    }

    #[must_use]
    pub fn timers(&self) -> &TimerWheel {
        &self.timers
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Whether stepping is currently enabled (active and visible).
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }
}
