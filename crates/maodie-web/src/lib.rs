#![cfg(target_arch = "wasm32")]
//! Browser embedding for the maodie screen effect.
//!
//! `start()` reads the layered configuration, mounts the sprite layer, and drives a
//! [`World`] from `requestAnimationFrame`. Pointer, resize, visibility, and click events
//! are forwarded into the world; deferred respawns and rescans run on a `setTimeout`
//! kept in sync with the world's timer wheel.

mod console;
mod dom;
mod options;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{Context, Result};
use js_sys::Reflect;
use maodie_core::{PageLayout, SpiderConfig, SpiderId, World};
use serde_wasm_bindgen::to_value;
use slotmap::KeyData;
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;
use web_sys::{Element, Event, EventTarget, MouseEvent};

use crate::dom::{DomLayout, DomPresenter, SPIDER_ID_ATTR, SPIDER_SELECTOR, dom_error};

/// Global under which the running handle is published for page scripts.
const WINDOW_HANDLE_KEY: &str = "MaodieSpider";

thread_local! {
    static ACTIVE: RefCell<Option<Rc<Runtime>>> = const { RefCell::new(None) };
}

/// Handle to the running effect.
#[wasm_bindgen]
pub struct SpiderHandle {
    inner: Rc<Runtime>,
}

struct Listener {
    target: EventTarget,
    kind: &'static str,
    capture: bool,
    callback: Closure<dyn FnMut(Event)>,
}

struct Runtime {
    world: RefCell<World>,
    config: SpiderConfig,
    layout: DomLayout,
    alive: Cell<bool>,
    frame_request: Cell<Option<i32>>,
    /// Pending `setTimeout` handle and the world deadline it was armed for.
    timer_request: Cell<Option<(i32, f64)>>,
    on_frame: RefCell<Option<Closure<dyn FnMut(f64)>>>,
    on_timer: RefCell<Option<Closure<dyn FnMut()>>>,
    listeners: RefCell<Vec<Listener>>,
}

impl Runtime {
    fn start(config: SpiderConfig) -> Result<Rc<Self>> {
        let layout = DomLayout::new()?;
        let presenter = DomPresenter::new(layout.document().clone());
        let mut world_config = config.clone();
        world_config.rng_seed.get_or_insert_with(random_seed);
        let world = World::new(world_config, Box::new(layout.clone()), Box::new(presenter))
            .context("invalid spider configuration")?;

        let runtime = Rc::new(Self {
            world: RefCell::new(world),
            config,
            layout,
            alive: Cell::new(true),
            frame_request: Cell::new(None),
            timer_request: Cell::new(None),
            on_frame: RefCell::new(None),
            on_timer: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        });
        if let Err(err) = runtime.install() {
            runtime.stop();
            return Err(err);
        }

        runtime.world.borrow_mut().activate(runtime.now());
        runtime.request_frame();
        runtime.sync_timer();
        Ok(runtime)
    }

    fn install(self: &Rc<Self>) -> Result<()> {
        let weak = Rc::downgrade(self);
        *self.on_frame.borrow_mut() = Some(Closure::wrap(Box::new(move |now: f64| {
            if let Some(runtime) = weak.upgrade() {
                runtime.on_frame(now);
            }
        }) as Box<dyn FnMut(f64)>));

        let weak = Rc::downgrade(self);
        *self.on_timer.borrow_mut() = Some(Closure::wrap(Box::new(move || {
            if let Some(runtime) = weak.upgrade() {
                runtime.on_timer();
            }
        }) as Box<dyn FnMut()>));

        let window: EventTarget = self.layout.window().clone().into();
        let document: EventTarget = self.layout.document().clone().into();
        self.listen(window.clone(), "mousemove", false, Self::on_pointer)?;
        self.listen(window, "resize", false, |runtime, _| runtime.on_resize())?;
        self.listen(document.clone(), "visibilitychange", false, |runtime, _| {
            runtime.on_visibility();
        })?;
        // Capture phase, so a struck sprite's click never reaches page handlers.
        self.listen(document, "click", true, Self::on_click)?;
        Ok(())
    }

    fn listen(
        self: &Rc<Self>,
        target: EventTarget,
        kind: &'static str,
        capture: bool,
        handler: fn(&Runtime, Event),
    ) -> Result<()> {
        let weak = Rc::downgrade(self);
        let callback = Closure::wrap(Box::new(move |event: Event| {
            if let Some(runtime) = weak.upgrade()
                && runtime.alive.get()
            {
                handler(&runtime, event);
            }
        }) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback_and_bool(
                kind,
                callback.as_ref().unchecked_ref(),
                capture,
            )
            .map_err(dom_error)
            .with_context(|| format!("failed to listen for {kind}"))?;
        self.listeners.borrow_mut().push(Listener {
            target,
            kind,
            capture,
            callback,
        });
        Ok(())
    }

    fn now(&self) -> f64 {
        self.layout
            .window()
            .performance()
            .map_or_else(js_sys::Date::now, |performance| performance.now())
    }

    fn request_frame(&self) {
        if !self.alive.get() || self.frame_request.get().is_some() {
            return;
        }
        let on_frame = self.on_frame.borrow();
        let Some(callback) = on_frame.as_ref() else {
            return;
        };
        match self
            .layout
            .window()
            .request_animation_frame(callback.as_ref().unchecked_ref())
        {
            Ok(id) => self.frame_request.set(Some(id)),
            Err(err) => warn!("requestAnimationFrame failed: {err:?}"),
        }
    }

    fn cancel_frame(&self) {
        if let Some(id) = self.frame_request.take() {
            let _ = self.layout.window().cancel_animation_frame(id);
        }
    }

    /// Keep exactly one timeout pending for the world's earliest timer deadline.
    fn sync_timer(&self) {
        let due = if self.alive.get() {
            self.world.borrow().timers().next_due()
        } else {
            None
        };
        let pending = self.timer_request.get();
        if pending.map(|(_, armed)| armed) == due {
            return;
        }
        if let Some((handle, _)) = self.timer_request.take() {
            self.layout.window().clear_timeout_with_handle(handle);
        }
        let Some(due) = due else {
            return;
        };
        let on_timer = self.on_timer.borrow();
        let Some(callback) = on_timer.as_ref() else {
            return;
        };
        let delay = (due - self.now()).max(0.0).ceil() as i32;
        match self
            .layout
            .window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                delay,
            ) {
            Ok(handle) => self.timer_request.set(Some((handle, due))),
            Err(err) => warn!("setTimeout failed: {err:?}"),
        }
    }

    fn on_frame(&self, now: f64) {
        self.frame_request.set(None);
        if !self.alive.get() {
            return;
        }
        self.world.borrow_mut().frame(now);
        self.sync_timer();
        self.request_frame();
    }

    fn on_timer(&self) {
        self.timer_request.set(None);
        if !self.alive.get() {
            return;
        }
        self.world.borrow_mut().poll_timers(self.now());
        self.sync_timer();
    }

    fn on_pointer(&self, event: Event) {
        let Some(event) = event.dyn_ref::<MouseEvent>() else {
            return;
        };
        let Some(viewport) = self.layout.viewport() else {
            return;
        };
        let point = viewport.to_document(f64::from(event.client_x()), f64::from(event.client_y()));
        self.world.borrow_mut().set_pointer(Some(point));
    }

    fn on_resize(&self) {
        self.world.borrow_mut().rescan_platforms(true);
        self.sync_timer();
    }

    fn on_visibility(&self) {
        let hidden = self.layout.document().hidden();
        self.world.borrow_mut().set_visible(!hidden, self.now());
        if hidden {
            self.cancel_frame();
        } else {
            self.request_frame();
        }
    }

    fn on_click(&self, event: Event) {
        let Some(sprite) = event
            .target()
            .and_then(|target| target.dyn_into::<Element>().ok())
            .and_then(|target| target.closest(SPIDER_SELECTOR).ok().flatten())
        else {
            return;
        };
        let Some(id) = sprite
            .get_attribute(SPIDER_ID_ATTR)
            .as_deref()
            .and_then(parse_spider_id)
        else {
            return;
        };
        if self.world.borrow_mut().strike(id) {
            event.stop_propagation();
        }
    }

    fn reload(&self) {
        if !self.alive.get() {
            return;
        }
        self.world.borrow_mut().reload();
        self.sync_timer();
    }

    fn kill_all(&self) {
        if !self.alive.get() {
            return;
        }
        self.world.borrow_mut().kill_all();
        self.sync_timer();
    }

    fn stop(&self) {
        if !self.alive.replace(false) {
            return;
        }
        self.cancel_frame();
        self.sync_timer();
        for listener in self.listeners.borrow_mut().drain(..) {
            let _ = listener.target.remove_event_listener_with_callback_and_bool(
                listener.kind,
                listener.callback.as_ref().unchecked_ref(),
                listener.capture,
            );
        }
        self.world.borrow_mut().deactivate();
        self.on_frame.borrow_mut().take();
        self.on_timer.borrow_mut().take();
        info!("spider effect stopped");
    }
}

#[wasm_bindgen]
impl SpiderHandle {
    /// Clear every spider, rescan the page, and refill.
    pub fn reload(&self) {
        self.inner.reload();
    }

    /// Remove every spider without respawning.
    #[wasm_bindgen(js_name = killAll)]
    pub fn kill_all(&self) {
        self.inner.kill_all();
    }

    /// Effective configuration the effect was started with.
    #[wasm_bindgen(getter)]
    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_value(&self.inner.config).map_err(js_error)
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> String {
        version()
    }

    #[wasm_bindgen(getter, js_name = spiderCount)]
    pub fn spider_count(&self) -> usize {
        self.inner.world.borrow().spider_count()
    }

    /// Tear the effect down: cancel callbacks, remove listeners, sprites, and the layer.
    pub fn stop(&self) {
        self.inner.stop();
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if active
                .as_ref()
                .is_some_and(|running| Rc::ptr_eq(running, &self.inner))
            {
                *active = None;
            }
        });
        if let Some(window) = web_sys::window() {
            let _ = Reflect::delete_property(&window, &JsValue::from_str(WINDOW_HANDLE_KEY));
        }
    }
}

/// Start the effect, or return the already running instance.
#[wasm_bindgen]
pub fn start(options: JsValue) -> Result<SpiderHandle, JsValue> {
    let running = ACTIVE.with(|active| active.borrow().clone());
    if let Some(inner) = running.filter(|runtime| runtime.alive.get()) {
        debug!("spider effect already running");
        return Ok(SpiderHandle { inner });
    }

    let window = web_sys::window().ok_or_else(|| js_error("no global window"))?;
    let config = options::resolve(&window, &options).map_err(js_error)?;
    console::install(config.debug);
    info!(count = config.count, debug = config.debug, "starting spider effect");

    let inner = Runtime::start(config).map_err(js_error)?;
    ACTIVE.with(|active| *active.borrow_mut() = Some(Rc::clone(&inner)));
    let published = SpiderHandle {
        inner: Rc::clone(&inner),
    };
    if let Err(err) = Reflect::set(
        &window,
        &JsValue::from_str(WINDOW_HANDLE_KEY),
        &JsValue::from(published),
    ) {
        warn!("could not publish window.{WINDOW_HANDLE_KEY}: {err:?}");
    }
    Ok(SpiderHandle { inner })
}

#[wasm_bindgen]
pub fn version() -> String {
    format!("maodie-web {}", maodie_core::VERSION)
}

/// Built-in defaults, before any page or caller overrides.
#[wasm_bindgen(js_name = defaultConfig)]
pub fn default_config() -> Result<JsValue, JsValue> {
    to_value(&SpiderConfig::default()).map_err(js_error)
}

fn parse_spider_id(raw: &str) -> Option<SpiderId> {
    let ffi = raw.trim().parse::<u64>().ok()?;
    Some(SpiderId::from(KeyData::from_ffi(ffi)))
}

fn random_seed() -> u64 {
    let word = || (js_sys::Math::random() * f64::from(u32::MAX)) as u64;
    (word() << 32) | word()
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsError::new(&err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maodie_core::Transform;
    use slotmap::{Key, SlotMap};
    use wasm_bindgen_test::*;
    use web_sys::HtmlElement;

    wasm_bindgen_test_configure!(run_in_browser);

    fn add_paragraphs(count: usize) -> Vec<Element> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .expect("document");
        let body = document.body().expect("body");
        (0..count)
            .map(|idx| {
                let paragraph = document.create_element("p").expect("p");
                paragraph.set_text_content(Some(&format!("paragraph {idx} ").repeat(40)));
                body.append_child(&paragraph).expect("append");
                paragraph
            })
            .collect()
    }

    #[wasm_bindgen_test]
    fn spider_ids_survive_the_dom_attribute() {
        let mut arena: SlotMap<SpiderId, ()> = SlotMap::with_key();
        let first = arena.insert(());
        arena.remove(first);
        let reused = arena.insert(());
        let encoded = reused.data().as_ffi().to_string();
        assert_eq!(parse_spider_id(&encoded), Some(reused));
        assert_ne!(parse_spider_id(&encoded), Some(first));
        assert_eq!(parse_spider_id("spider"), None);
    }

    #[wasm_bindgen_test]
    fn dataset_values_parse_leniently() {
        assert_eq!(options::parse_number(" 12 "), Some(12.0));
        assert_eq!(options::parse_number("abc"), None);
        assert_eq!(options::parse_number("NaN"), None);
        assert!(options::parse_flag("true"));
        assert!(options::parse_flag("1"));
        assert!(!options::parse_flag("yes"));
    }

    #[wasm_bindgen_test]
    fn transforms_render_as_css() {
        let css = dom::transform_css(&Transform {
            translate_x: 12.0,
            translate_y: -4.0,
            scale_x: -1.0,
            rotation_deg: 90.0,
            opacity: 1.0,
            interactive: true,
        });
        assert_eq!(css, "translate3d(12px, -4px, 0) scaleX(-1) rotate(90deg)");
    }

    #[wasm_bindgen_test]
    fn struck_sprite_clicks_stay_out_of_page_handlers() {
        let paragraphs = add_paragraphs(3);
        let document = web_sys::window()
            .and_then(|window| window.document())
            .expect("document");
        let body = document.body().expect("body");
        let page_clicks = Rc::new(Cell::new(0_u32));
        let counter = Rc::clone(&page_clicks);
        let on_body_click = Closure::wrap(Box::new(move |_: Event| {
            counter.set(counter.get() + 1);
        }) as Box<dyn FnMut(Event)>);
        body.add_event_listener_with_callback("click", on_body_click.as_ref().unchecked_ref())
            .expect("listen");

        let options = to_value(&SpiderConfig {
            count: 2,
            rng_seed: Some(9),
            ..SpiderConfig::default()
        })
        .expect("options");
        let handle = start(options).expect("start");
        let sprite = document
            .query_selector(SPIDER_SELECTOR)
            .expect("query")
            .expect("sprite")
            .dyn_into::<HtmlElement>()
            .expect("sprite element");
        sprite.click();
        assert_eq!(page_clicks.get(), 0);
        assert_eq!(
            sprite
                .style()
                .get_property_value("pointer-events")
                .expect("style"),
            "none"
        );

        paragraphs[0]
            .dyn_ref::<HtmlElement>()
            .expect("paragraph element")
            .click();
        assert_eq!(page_clicks.get(), 1);

        handle.stop();
        body.remove_event_listener_with_callback("click", on_body_click.as_ref().unchecked_ref())
            .expect("unlisten");
        for paragraph in paragraphs {
            paragraph.remove();
        }
    }

    #[wasm_bindgen_test]
    fn start_is_a_singleton_and_stop_cleans_up() {
        let paragraphs = add_paragraphs(4);
        let options = to_value(&SpiderConfig {
            count: 3,
            rng_seed: Some(7),
            ..SpiderConfig::default()
        })
        .expect("options");

        let first = start(options.clone()).expect("start");
        let second = start(options).expect("second start");
        assert!(Rc::ptr_eq(&first.inner, &second.inner));
        assert_eq!(first.spider_count(), 3);

        let document = web_sys::window()
            .and_then(|window| window.document())
            .expect("document");
        let sprites = document
            .query_selector_all(SPIDER_SELECTOR)
            .expect("query")
            .length();
        assert_eq!(sprites, 3);

        first.kill_all();
        assert_eq!(first.spider_count(), 0);
        first.reload();
        assert_eq!(first.spider_count(), 3);

        first.stop();
        assert_eq!(first.spider_count(), 0);
        assert!(
            document
                .query_selector(".maodie-spider-layer")
                .expect("query")
                .is_none()
        );
        second.stop();
        for paragraph in paragraphs {
            paragraph.remove();
        }
    }
}
