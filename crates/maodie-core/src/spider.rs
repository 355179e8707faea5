//! Per-spider behaviour: a five-state machine layered over a 2D point-mass integrator.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::platform::{PlatformRef, PlatformSet};
use crate::{Point, SpiderConfig, Viewport, lerp, random_sign, sample_range};

/// Fraction of the sprite width kept clear of the platform ends when spawning.
const SPAWN_MARGIN: f64 = 0.3;
/// A foot this far below a platform surface still counts as standing on it at spawn.
const SPAWN_SNAP_ABOVE: f64 = 8.0;
/// Vertical slack allowed between a grounded foot and its platform.
const SUPPORT_TOLERANCE: f64 = 4.0;
/// Rate (1/s) at which horizontal velocity converges on its target.
const VELOCITY_SMOOTHING: f64 = 6.0;
/// Minimum distance from a platform end at which the edge reaction triggers.
const EDGE_THRESHOLD_MIN: f64 = 18.0;
const EDGE_THRESHOLD_WIDTH_RATIO: f64 = 0.25;
const EDGE_JUMP_PROBABILITY: f64 = 0.8;
const SCARE_SECONDS: (f64, f64) = (1.0, 1.2);
const ROLL_LAUNCH_VY: (f64, f64) = (-200.0, -100.0);
const ROLL_LAUNCH_VX: (f64, f64) = (80.0, 180.0);
const ROLL_SPIN_DEG: (f64, f64) = (360.0, 720.0);
/// Opacity lost per second while rolling off.
const ROLL_FADE_RATE: f64 = 0.9;
/// A rolling spider is dropped once it is this far below the viewport.
const ROLL_DESPAWN_MARGIN: f64 = 300.0;

/// Behavioural state. Exactly one is active at a time; `RollOff` is absorbing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Behavior {
    #[default]
    Walk,
    Idle,
    Jump,
    Scare,
    RollOff,
}

/// Ground linkage. A grounded spider always knows which platform it stands on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Footing {
    #[default]
    Airborne,
    Grounded(PlatformRef),
}

/// Why a spider left the world.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Finished the roll-off animation.
    RolledOff,
    /// Fell past the bottom of the document or viewport.
    Fell,
    /// Cleared by the manager (kill-all, reload, teardown).
    Cleared,
}

/// Linear velocity in px/s; positive `vy` points down the page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

/// Visual state handed to the presenter after every step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    /// Left edge relative to the viewport, rounded to whole px.
    pub translate_x: f64,
    /// Top edge relative to the viewport, rounded to whole px.
    pub translate_y: f64,
    /// `1.0` facing right, `-1.0` mirrored.
    pub scale_x: f64,
    pub rotation_deg: f64,
    pub opacity: f64,
    /// Whether the sprite should still receive pointer hits.
    pub interactive: bool,
}

/// Inputs shared by every spider for one simulation step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Current time in milliseconds.
    pub now: f64,
    /// Elapsed time since the previous step in seconds.
    pub dt: f64,
    /// Pointer position in document space; `None` until the pointer has moved.
    pub pointer: Option<Point>,
    pub platforms: &'a PlatformSet,
    pub viewport: &'a Viewport,
    pub config: &'a SpiderConfig,
}

/// One roaming spider.
#[derive(Debug, Clone)]
pub struct Spider {
    serial: u64,
    width: f64,
    height: f64,
    pub position: Point,
    pub velocity: Velocity,
    /// Facing: `-1.0` left, `1.0` right.
    pub direction: f64,
    pub rotation: f64,
    /// Degrees per second.
    pub angular_velocity: f64,
    pub opacity: f64,
    behavior: Behavior,
    state_until: Option<f64>,
    footing: Footing,
    removed: bool,
}

impl Spider {
    /// Build an airborne walking spider at `position` heading in `direction` at `speed`.
    #[must_use]
    pub fn new(
        serial: u64,
        width: f64,
        height: f64,
        position: Point,
        direction: f64,
        speed: f64,
    ) -> Self {
        let direction = if direction < 0.0 { -1.0 } else { 1.0 };
        Self {
            serial,
            width,
            height,
            position,
            velocity: Velocity {
                vx: speed * direction,
                vy: 0.0,
            },
            direction,
            rotation: 0.0,
            angular_velocity: 0.0,
            opacity: 1.0,
            behavior: Behavior::Walk,
            state_until: None,
            footing: Footing::Airborne,
            removed: false,
        }
    }

    /// Spawn a randomly sized spider on platform `index`, then settle it on the nearest
    /// surface under its foot. Returns `None` when `index` is not in the current set.
    pub fn spawn(
        serial: u64,
        platforms: &PlatformSet,
        index: usize,
        config: &SpiderConfig,
        rng: &mut impl Rng,
    ) -> Option<Self> {
        let platform = *platforms.as_slice().get(index)?;
        let scale = sample_range(rng, config.scale_min, config.scale_max);
        let width = (config.sprite_width * scale).round();
        let height = (config.sprite_height * scale).round();
        let direction = random_sign(rng);
        let speed = sample_range(rng, config.speed_min, config.speed_max);
        let margin = width * SPAWN_MARGIN;
        let x = if platform.x2 - margin > platform.x1 + margin {
            sample_range(rng, platform.x1 + margin, platform.x2 - margin)
        } else {
            (platform.x1 + platform.x2) * 0.5
        };
        let mut spider = Self::new(
            serial,
            width,
            height,
            Point::new(x, platform.y - height * 0.5),
            direction,
            speed,
        );
        spider.settle(platforms);
        Some(spider)
    }

    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub const fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }

    #[must_use]
    pub const fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// Expiry time (ms) of the current timed state, if any.
    #[must_use]
    pub const fn state_until(&self) -> Option<f64> {
        self.state_until
    }

    #[must_use]
    pub const fn footing(&self) -> Footing {
        self.footing
    }

    #[must_use]
    pub const fn is_grounded(&self) -> bool {
        matches!(self.footing, Footing::Grounded(_))
    }

    #[must_use]
    pub const fn current_platform(&self) -> Option<PlatformRef> {
        match self.footing {
            Footing::Grounded(platform) => Some(platform),
            Footing::Airborne => None,
        }
    }

    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    fn half_height(&self) -> f64 {
        self.height * 0.5
    }

    fn foot_y(&self) -> f64 {
        self.position.y + self.half_height()
    }

    /// Enter `behavior`, timed for `duration` seconds when positive. No-op while rolling off.
    fn set_state(&mut self, behavior: Behavior, duration: f64, now: f64) {
        if self.behavior == Behavior::RollOff {
            return;
        }
        self.behavior = behavior;
        self.state_until = (duration > 0.0).then(|| now + duration * 1000.0);
    }

    fn is_state_expired(&self, now: f64) -> bool {
        self.state_until.is_some_and(|until| now >= until)
    }

    fn unground(&mut self) {
        self.footing = Footing::Airborne;
    }

    /// Pin the spider onto platform `index` of `platforms`.
    pub fn ground_on(&mut self, platforms: &PlatformSet, index: usize) -> bool {
        let (Some(reference), Some(platform)) =
            (platforms.reference(index), platforms.as_slice().get(index))
        else {
            return false;
        };
        self.position.y = platform.y - self.half_height();
        self.velocity.vy = 0.0;
        self.footing = Footing::Grounded(reference);
        true
    }

    /// Land on the closest surface at or below the foot (or just above it).
    fn settle(&mut self, platforms: &PlatformSet) {
        let foot_x = self.position.x;
        let foot_y = self.foot_y();
        let mut best: Option<(usize, f64)> = None;
        for (idx, platform) in platforms.as_slice().iter().enumerate() {
            if !platform.spans(foot_x) {
                continue;
            }
            let dy = platform.y - foot_y;
            if dy >= -SPAWN_SNAP_ABOVE && best.is_none_or(|(_, best_dy)| dy < best_dy) {
                best = Some((idx, dy));
            }
        }
        if let Some((idx, _)) = best {
            self.ground_on(platforms, idx);
        }
    }

    /// Topmost platform whose surface the foot crossed moving from `old_foot_y` to `new_foot_y`.
    fn detect_landing(
        &self,
        platforms: &PlatformSet,
        old_foot_y: f64,
        new_foot_y: f64,
    ) -> Option<usize> {
        let foot_x = self.position.x;
        let mut landed: Option<(usize, f64)> = None;
        for (idx, platform) in platforms.as_slice().iter().enumerate() {
            if !platform.spans(foot_x) {
                continue;
            }
            let crossed = old_foot_y <= platform.y && new_foot_y >= platform.y;
            if crossed && landed.is_none_or(|(_, y)| platform.y < y) {
                landed = Some((idx, platform.y));
            }
        }
        landed.map(|(idx, _)| idx)
    }

    fn check_scare(
        &mut self,
        pointer: Point,
        config: &SpiderConfig,
        now: f64,
        rng: &mut impl Rng,
    ) {
        if self.behavior == Behavior::RollOff {
            return;
        }
        if self.position.distance(pointer) <= config.scare_radius {
            let duration = sample_range(rng, SCARE_SECONDS.0, SCARE_SECONDS.1);
            self.set_state(Behavior::Scare, duration, now);
        }
    }

    /// Near the end of the current platform, either leap (usually) or turn around.
    fn maybe_jump_at_edge(
        &mut self,
        platforms: &PlatformSet,
        config: &SpiderConfig,
        now: f64,
        rng: &mut impl Rng,
    ) -> bool {
        let Some(platform) = self
            .current_platform()
            .and_then(|reference| platforms.resolve(reference))
        else {
            return false;
        };
        let edge_distance = if self.direction > 0.0 {
            platform.x2 - self.position.x
        } else {
            self.position.x - platform.x1
        };
        let threshold = EDGE_THRESHOLD_MIN.max(self.width * EDGE_THRESHOLD_WIDTH_RATIO);
        if edge_distance > threshold {
            return false;
        }
        if rng.random_bool(EDGE_JUMP_PROBABILITY) {
            self.velocity.vy = -sample_range(rng, config.jump_speed_min, config.jump_speed_max);
            self.unground();
            self.set_state(Behavior::Jump, 0.0, now);
            true
        } else {
            self.direction = -self.direction;
            self.velocity.vx = self.velocity.vx.abs() * self.direction;
            false
        }
    }

    /// Direct hit: start the roll-off. Returns `false` if already rolling off.
    pub fn roll_off(&mut self, rng: &mut impl Rng) -> bool {
        if self.behavior == Behavior::RollOff || self.removed {
            return false;
        }
        self.behavior = Behavior::RollOff;
        self.state_until = None;
        self.unground();
        self.velocity.vy = sample_range(rng, ROLL_LAUNCH_VY.0, ROLL_LAUNCH_VY.1);
        self.velocity.vx = self.direction * sample_range(rng, ROLL_LAUNCH_VX.0, ROLL_LAUNCH_VX.1);
        self.angular_velocity =
            random_sign(rng) * sample_range(rng, ROLL_SPIN_DEG.0, ROLL_SPIN_DEG.1);
        true
    }

    /// Mark the spider removed. Yields the reason only on the first call.
    pub fn destroy(&mut self, reason: RemovalReason) -> Option<RemovalReason> {
        if self.removed {
            return None;
        }
        self.removed = true;
        Some(reason)
    }

    fn step_roll_off(&mut self, ctx: &StepContext<'_>) -> Option<RemovalReason> {
        let dt = ctx.dt;
        self.velocity.vy += ctx.config.gravity * dt;
        self.position.x += self.velocity.vx * dt;
        self.position.y += self.velocity.vy * dt;
        self.rotation += self.angular_velocity * dt;
        self.opacity -= ROLL_FADE_RATE * dt;
        let below_view = self.position.y - ctx.viewport.scroll_y;
        if self.opacity <= 0.0 || below_view > ctx.viewport.height + ROLL_DESPAWN_MARGIN {
            return self.destroy(RemovalReason::RolledOff);
        }
        None
    }

    /// Advance one step. Returns the removal reason on the step the spider leaves the world.
    pub fn update(&mut self, ctx: &StepContext<'_>, rng: &mut impl Rng) -> Option<RemovalReason> {
        if self.removed {
            return None;
        }
        if self.behavior == Behavior::RollOff {
            return self.step_roll_off(ctx);
        }

        let config = ctx.config;
        let dt = ctx.dt;
        let now = ctx.now;

        if let Some(pointer) = ctx.pointer {
            self.check_scare(pointer, config, now, rng);
        }

        if self.is_state_expired(now) && matches!(self.behavior, Behavior::Scare | Behavior::Idle)
        {
            self.set_state(Behavior::Walk, 0.0, now);
        }

        if self.behavior == Behavior::Walk && rng.random::<f64>() < config.idle_chance * dt {
            let duration = sample_range(rng, config.idle_min, config.idle_max);
            self.set_state(Behavior::Idle, duration, now);
        }

        let mut speed = self.velocity.vx.abs().clamp(config.speed_min, config.speed_max);
        if self.behavior == Behavior::Scare {
            speed *= config.scare_speed_multiplier;
        }
        let target_vx = if self.behavior == Behavior::Idle {
            0.0
        } else {
            speed * self.direction
        };
        self.velocity.vx = lerp(
            self.velocity.vx,
            target_vx,
            (dt * VELOCITY_SMOOTHING).clamp(0.0, 1.0),
        );

        let was_grounded = self.is_grounded();
        let old_foot_y = self.foot_y();
        if !was_grounded {
            self.velocity.vy += config.gravity * dt;
        }

        self.position.x += self.velocity.vx * dt;
        self.position.y += self.velocity.vy * dt;

        let half_width = self.width * 0.5;
        let half_height = self.half_height();
        let document_width = ctx.viewport.document_width;
        if self.position.x < half_width {
            self.position.x = half_width;
            self.direction = 1.0;
            self.velocity.vx = self.velocity.vx.abs();
        } else if self.position.x > document_width - half_width {
            self.position.x = document_width - half_width;
            self.direction = -1.0;
            self.velocity.vx = -self.velocity.vx.abs();
        }

        let new_foot_y = self.position.y + half_height;
        let supported = self
            .current_platform()
            .and_then(|reference| ctx.platforms.resolve(reference).map(|p| (reference, *p)));
        match (was_grounded, supported) {
            (true, Some((reference, platform))) => {
                let on_top = platform.spans(self.position.x);
                let near = (new_foot_y - platform.y).abs() <= SUPPORT_TOLERANCE;
                if on_top && near {
                    self.position.y = platform.y - half_height;
                    self.velocity.vy = 0.0;
                    self.footing = Footing::Grounded(reference);
                } else {
                    self.unground();
                }
            }
            _ => match self.detect_landing(ctx.platforms, old_foot_y, new_foot_y) {
                Some(idx) => {
                    self.ground_on(ctx.platforms, idx);
                    if !was_grounded && self.behavior == Behavior::Jump {
                        self.set_state(Behavior::Walk, 0.0, now);
                    }
                }
                None => self.unground(),
            },
        }

        if !matches!(self.behavior, Behavior::Jump | Behavior::Idle) {
            self.maybe_jump_at_edge(ctx.platforms, config, now, rng);
        }

        let off_document = self.position.y > ctx.viewport.document_height + self.height;
        let off_view =
            self.position.y - ctx.viewport.scroll_y > ctx.viewport.height + self.height;
        if off_document || off_view {
            return self.destroy(RemovalReason::Fell);
        }

        if self.velocity.vx != 0.0 {
            self.direction = self.velocity.vx.signum();
        }
        None
    }

    /// Viewport-relative visual state for the presenter.
    #[must_use]
    pub fn transform(&self, viewport: &Viewport) -> Transform {
        Transform {
            translate_x: (self.position.x - viewport.scroll_x - self.width * 0.5).round(),
            translate_y: (self.position.y - viewport.scroll_y - self.half_height()).round(),
            scale_x: self.direction,
            rotation_deg: self.rotation,
            opacity: self.opacity.clamp(0.0, 1.0),
            interactive: self.behavior != Behavior::RollOff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ElementKey, Platform};
    use rand::{SeedableRng, rngs::SmallRng};

    const WIDTH: f64 = 60.0;
    const HEIGHT: f64 = 20.0;

    fn calm_config() -> SpiderConfig {
        SpiderConfig {
            idle_chance: 0.0,
            ..SpiderConfig::default()
        }
    }

    fn platforms(items: &[(f64, f64, f64)]) -> PlatformSet {
        let mut set = PlatformSet::new();
        set.replace(
            items
                .iter()
                .map(|&(x1, x2, y)| Platform {
                    x1,
                    x2,
                    y,
                    source: ElementKey::default(),
                })
                .collect(),
        );
        set
    }

    fn ctx<'a>(
        now: f64,
        dt: f64,
        pointer: Option<Point>,
        platforms: &'a PlatformSet,
        viewport: &'a Viewport,
        config: &'a SpiderConfig,
    ) -> StepContext<'a> {
        StepContext {
            now,
            dt,
            pointer,
            platforms,
            viewport,
            config,
        }
    }

    fn grounded_spider(set: &PlatformSet, index: usize, x: f64, direction: f64) -> Spider {
        let mut spider = Spider::new(1, WIDTH, HEIGHT, Point::new(x, 0.0), direction, 70.0);
        assert!(spider.ground_on(set, index));
        spider
    }

    #[test]
    fn falling_spider_lands_on_crossed_platform() {
        let set = platforms(&[(0.0, 500.0, 300.0)]);
        let viewport = Viewport::default();
        let config = SpiderConfig {
            gravity: 0.0,
            ..calm_config()
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let start = Point::new(250.0, 200.0 - HEIGHT * 0.5);
        let mut spider = Spider::new(1, WIDTH, HEIGHT, start, 1.0, 0.0);
        spider.velocity.vy = 110.0 / 0.05;

        let removed = spider.update(&ctx(0.0, 0.05, None, &set, &viewport, &config), &mut rng);

        assert!(removed.is_none());
        assert!(spider.is_grounded());
        assert_eq!(spider.current_platform(), set.reference(0));
        assert!((spider.position.y - (300.0 - HEIGHT * 0.5)).abs() < 1e-9);
        assert_eq!(spider.velocity.vy, 0.0);
    }

    #[test]
    fn landing_prefers_topmost_crossed_surface() {
        let set = platforms(&[(0.0, 500.0, 250.0), (0.0, 500.0, 280.0)]);
        let spider = Spider::new(1, WIDTH, HEIGHT, Point::new(100.0, 0.0), 1.0, 0.0);
        assert_eq!(spider.detect_landing(&set, 200.0, 310.0), Some(0));
        assert_eq!(spider.detect_landing(&set, 260.0, 310.0), Some(1));
        assert_eq!(spider.detect_landing(&set, 200.0, 240.0), None);
    }

    #[test]
    fn nearby_pointer_scares_spider() {
        let set = PlatformSet::new();
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(2);
        let mut spider = Spider::new(1, WIDTH, HEIGHT, Point::new(110.0, 105.0), 1.0, 70.0);

        let pointer = Some(Point::new(100.0, 100.0));
        spider.update(
            &ctx(1_000.0, 0.016, pointer, &set, &viewport, &config),
            &mut rng,
        );

        assert_eq!(spider.behavior(), Behavior::Scare);
        let until = spider.state_until().expect("timed");
        assert!((2_000.0..=2_200.0).contains(&until));
    }

    #[test]
    fn lingering_pointer_keeps_refreshing_scare() {
        let set = PlatformSet::new();
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut spider = Spider::new(1, WIDTH, HEIGHT, Point::new(300.0, 100.0), 1.0, 70.0);
        let pointer = Some(Point::new(300.0, 100.0));

        spider.update(&ctx(0.0, 0.0, pointer, &set, &viewport, &config), &mut rng);
        let first = spider.state_until().expect("timed");
        spider.update(&ctx(900.0, 0.0, pointer, &set, &viewport, &config), &mut rng);
        let second = spider.state_until().expect("timed");
        assert!(second > first);
        assert_eq!(spider.behavior(), Behavior::Scare);
    }

    #[test]
    fn scare_expires_back_to_walk() {
        let set = PlatformSet::new();
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(4);
        let mut spider = Spider::new(1, WIDTH, HEIGHT, Point::new(300.0, 100.0), 1.0, 70.0);

        let pointer = Some(Point::new(300.0, 100.0));
        spider.update(&ctx(0.0, 0.0, pointer, &set, &viewport, &config), &mut rng);
        assert_eq!(spider.behavior(), Behavior::Scare);
        spider.update(&ctx(1_500.0, 0.0, None, &set, &viewport, &config), &mut rng);
        assert_eq!(spider.behavior(), Behavior::Walk);
        assert!(spider.state_until().is_none());
    }

    #[test]
    fn idle_stops_and_resumes() {
        let set = platforms(&[(0.0, 1_000.0, 300.0)]);
        let viewport = Viewport::default();
        let config = SpiderConfig {
            idle_chance: 1_000.0,
            idle_min: 0.5,
            idle_max: 0.5,
            ..SpiderConfig::default()
        };
        let mut rng = SmallRng::seed_from_u64(5);
        let mut spider = grounded_spider(&set, 0, 500.0, 1.0);

        spider.update(&ctx(0.0, 0.016, None, &set, &viewport, &config), &mut rng);
        assert_eq!(spider.behavior(), Behavior::Idle);
        assert_eq!(spider.state_until(), Some(500.0));

        let mut now = 0.0;
        while now < 480.0 {
            now += 16.0;
            spider.update(&ctx(now, 0.016, None, &set, &viewport, &config), &mut rng);
        }
        assert!(spider.velocity.vx.abs() < 5.0);

        let calm = calm_config();
        spider.update(&ctx(520.0, 0.016, None, &set, &viewport, &calm), &mut rng);
        assert_eq!(spider.behavior(), Behavior::Walk);
    }

    #[test]
    fn grounded_spider_stays_pinned_to_surface() {
        let set = platforms(&[(0.0, 1_000.0, 300.0)]);
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(6);
        let mut spider = grounded_spider(&set, 0, 400.0, 1.0);

        for step in 0..60 {
            spider.update(
                &ctx(f64::from(step) * 16.0, 0.016, None, &set, &viewport, &config),
                &mut rng,
            );
            if spider.is_grounded() {
                assert!((spider.position.y - (300.0 - HEIGHT * 0.5)).abs() < 1e-9);
            }
        }
        assert!(spider.is_grounded());
        assert!(spider.position.x > 400.0);
    }

    #[test]
    fn edge_reaction_jumps_about_four_times_in_five() {
        let set = platforms(&[(0.0, 500.0, 300.0)]);
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(7);
        let trials = 4_000;
        let mut jumps = 0;
        for _ in 0..trials {
            let mut spider = grounded_spider(&set, 0, 495.0, 1.0);
            if spider.maybe_jump_at_edge(&set, &config, 0.0, &mut rng) {
                jumps += 1;
                assert_eq!(spider.behavior(), Behavior::Jump);
                assert!(!spider.is_grounded());
                assert!(spider.velocity.vy <= -config.jump_speed_min);
                assert!(spider.velocity.vy >= -config.jump_speed_max);
            } else {
                assert!(spider.is_grounded());
                assert_eq!(spider.direction, -1.0);
                assert!(spider.velocity.vx < 0.0);
            }
        }
        let ratio = f64::from(jumps) / f64::from(trials);
        assert!((0.76..=0.84).contains(&ratio), "jump ratio {ratio}");
    }

    #[test]
    fn edge_reaction_ignores_spiders_far_from_edges() {
        let set = platforms(&[(0.0, 500.0, 300.0)]);
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(8);
        let mut spider = grounded_spider(&set, 0, 250.0, 1.0);
        assert!(!spider.maybe_jump_at_edge(&set, &config, 0.0, &mut rng));
        assert_eq!(spider.direction, 1.0);
        assert!(spider.is_grounded());
    }

    #[test]
    fn jump_lands_and_returns_to_walk() {
        let set = platforms(&[(0.0, 2_000.0, 300.0)]);
        let viewport = Viewport::unscrolled(2_000.0, 800.0);
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut spider = grounded_spider(&set, 0, 1_000.0, 1.0);
        spider.velocity.vy = -450.0;
        spider.unground();
        spider.set_state(Behavior::Jump, 0.0, 0.0);

        let mut now = 0.0;
        for _ in 0..100 {
            now += 16.0;
            spider.update(&ctx(now, 0.016, None, &set, &viewport, &config), &mut rng);
            if spider.is_grounded() {
                break;
            }
        }
        assert!(spider.is_grounded());
        assert_eq!(spider.behavior(), Behavior::Walk);
    }

    #[test]
    fn stale_platform_reference_relands_on_rescanned_surface() {
        let mut set = platforms(&[(0.0, 1_000.0, 300.0)]);
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(10);
        let mut spider = grounded_spider(&set, 0, 500.0, 1.0);
        let before = spider.current_platform();

        set.replace(vec![Platform {
            x1: 0.0,
            x2: 1_000.0,
            y: 300.0,
            source: ElementKey(3),
        }]);
        spider.update(&ctx(0.0, 0.016, None, &set, &viewport, &config), &mut rng);

        assert!(spider.is_grounded());
        assert_ne!(spider.current_platform(), before);
        assert!(set.resolve(spider.current_platform().expect("grounded")).is_some());
    }

    #[test]
    fn walking_off_a_vanished_platform_ungrounds() {
        let mut set = platforms(&[(0.0, 1_000.0, 300.0)]);
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(11);
        let mut spider = grounded_spider(&set, 0, 500.0, 1.0);

        set.replace(Vec::new());
        spider.update(&ctx(0.0, 0.016, None, &set, &viewport, &config), &mut rng);

        assert!(!spider.is_grounded());
        assert!(spider.current_platform().is_none());
    }

    #[test]
    fn roll_off_is_absorbing_and_reports_removal_once() {
        let set = platforms(&[(0.0, 1_000.0, 300.0)]);
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(12);
        let mut spider = grounded_spider(&set, 0, 500.0, 1.0);

        assert!(spider.roll_off(&mut rng));
        assert!(!spider.roll_off(&mut rng));
        assert_eq!(spider.behavior(), Behavior::RollOff);
        assert!(!spider.transform(&viewport).interactive);
        assert!(spider.velocity.vy < 0.0);
        spider.set_state(Behavior::Walk, 0.0, 0.0);
        assert_eq!(spider.behavior(), Behavior::RollOff);

        let pointer = Some(spider.position);
        let mut removals = Vec::new();
        let mut now = 0.0;
        for _ in 0..200 {
            now += 16.0;
            if let Some(reason) =
                spider.update(&ctx(now, 0.016, pointer, &set, &viewport, &config), &mut rng)
            {
                removals.push(reason);
            }
            assert_eq!(spider.behavior(), Behavior::RollOff);
        }
        assert_eq!(removals, vec![RemovalReason::RolledOff]);
        assert!(spider.is_removed());
    }

    #[test]
    fn spider_falling_below_viewport_is_removed() {
        let set = PlatformSet::new();
        let viewport = Viewport::default();
        let config = calm_config();
        let mut rng = SmallRng::seed_from_u64(13);
        let mut spider = Spider::new(1, WIDTH, HEIGHT, Point::new(300.0, 700.0), 1.0, 70.0);

        let mut reason = None;
        let mut now = 0.0;
        for _ in 0..100 {
            now += 16.0;
            reason = spider.update(&ctx(now, 0.016, None, &set, &viewport, &config), &mut rng);
            if reason.is_some() {
                break;
            }
        }
        assert_eq!(reason, Some(RemovalReason::Fell));
    }

    #[test]
    fn horizontal_bounds_flip_direction() {
        let set = platforms(&[(0.0, 1_280.0, 300.0)]);
        let viewport = Viewport::default();
        let config = SpiderConfig {
            jump_speed_min: 0.0,
            jump_speed_max: 0.0,
            ..calm_config()
        };
        let mut rng = SmallRng::seed_from_u64(14);
        let mut spider = grounded_spider(&set, 0, WIDTH * 0.5 + 0.5, -1.0);
        spider.update(&ctx(0.0, 0.05, None, &set, &viewport, &config), &mut rng);
        assert!(spider.position.x >= WIDTH * 0.5);
        assert_eq!(spider.direction, 1.0);
    }

    #[test]
    fn transform_is_viewport_relative_and_mirrored() {
        let viewport = Viewport {
            scroll_x: 0.0,
            scroll_y: 100.0,
            ..Viewport::default()
        };
        let spider = Spider::new(1, WIDTH, HEIGHT, Point::new(200.4, 300.0), -1.0, 70.0);
        let transform = spider.transform(&viewport);
        assert_eq!(transform.translate_x, 170.0);
        assert_eq!(transform.translate_y, 190.0);
        assert_eq!(transform.scale_x, -1.0);
        assert!(transform.interactive);
    }

    #[test]
    fn spawn_places_spider_on_requested_platform() {
        let set = platforms(&[(100.0, 400.0, 200.0), (0.0, 1_000.0, 600.0)]);
        let config = SpiderConfig::default();
        let mut rng = SmallRng::seed_from_u64(15);
        for serial in 0..50 {
            let spider = Spider::spawn(serial, &set, 0, &config, &mut rng).expect("spawn");
            assert!(spider.is_grounded());
            assert_eq!(spider.current_platform(), set.reference(0));
            assert!(spider.position.x >= 100.0 && spider.position.x <= 400.0);
            assert_eq!(spider.behavior(), Behavior::Walk);
            assert!(spider.velocity.vx.abs() >= config.speed_min);
        }
        assert!(Spider::spawn(99, &set, 5, &config, &mut rng).is_none());
    }
}
