//! `web-sys` implementations of the host traits.

use anyhow::{Context, Result, anyhow};
use maodie_core::{
    ElementBox, ElementKey, PageLayout, Platform, Presenter, SpiderConfig, SpiderId, Transform,
    Viewport,
};
use slotmap::{Key, SecondaryMap};
use tracing::warn;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, Window};

/// Elements whose top edges become platforms.
const PLATFORM_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li, blockquote, img, figure, picture";
const LAYER_CLASS: &str = "maodie-spider-layer";
const LAYER_SELECTOR: &str = ".maodie-spider-layer";
const SPIDER_CLASS: &str = "maodie-spider";
pub(crate) const SPIDER_SELECTOR: &str = ".maodie-spider";
pub(crate) const SPIDER_ID_ATTR: &str = "data-spider-id";
const DEBUG_LINE_CLASS: &str = "maodie-debug-line";
const STYLE_ID: &str = "maodie-style";
const GIF_URL: &str = "maodie.gif";

pub(crate) fn dom_error(err: JsValue) -> anyhow::Error {
    anyhow!("{err:?}")
}

/// Live page geometry read through `getBoundingClientRect` and computed styles.
#[derive(Clone)]
pub(crate) struct DomLayout {
    window: Window,
    document: Document,
}

impl DomLayout {
    pub(crate) fn new() -> Result<Self> {
        let window = web_sys::window().context("no global window")?;
        let document = window.document().context("window has no document")?;
        Ok(Self { window, document })
    }

    pub(crate) fn window(&self) -> &Window {
        &self.window
    }

    pub(crate) fn document(&self) -> &Document {
        &self.document
    }

    fn read_element(&self, key: u32, element: &Element) -> Option<ElementBox> {
        let style = self.window.get_computed_style(element).ok().flatten()?;
        let property = |name: &str| style.get_property_value(name).unwrap_or_default();
        let rect = element.get_bounding_client_rect();
        Some(ElementBox {
            key: ElementKey(key),
            left: rect.left(),
            top: rect.top(),
            width: rect.width(),
            height: rect.height(),
            display_none: property("display") == "none",
            visibility_hidden: property("visibility") == "hidden",
            opacity: property("opacity").trim().parse().unwrap_or(1.0),
            position_fixed: property("position") == "fixed",
            in_overlay: element.closest(LAYER_SELECTOR).ok().flatten().is_some(),
        })
    }
}

impl PageLayout for DomLayout {
    fn viewport(&self) -> Option<Viewport> {
        let root = self.document.document_element()?;
        let extent = |value: Result<JsValue, JsValue>| {
            value.ok().and_then(|v| v.as_f64()).unwrap_or_default()
        };
        Some(Viewport {
            scroll_x: self.window.scroll_x().unwrap_or_default(),
            scroll_y: self.window.scroll_y().unwrap_or_default(),
            width: extent(self.window.inner_width()),
            height: extent(self.window.inner_height()),
            document_width: f64::from(root.scroll_width().max(root.client_width())),
            document_height: f64::from(root.scroll_height().max(root.client_height())),
        })
    }

    fn elements(&self) -> Vec<ElementBox> {
        let Ok(nodes) = self.document.query_selector_all(PLATFORM_SELECTOR) else {
            return Vec::new();
        };
        (0..nodes.length())
            .filter_map(|idx| {
                let element = nodes.item(idx)?.dyn_into::<Element>().ok()?;
                self.read_element(idx, &element)
            })
            .collect()
    }
}

/// Draws spiders as absolutely positioned divs inside a fixed full-screen layer.
pub(crate) struct DomPresenter {
    document: Document,
    layer: Option<HtmlElement>,
    debug_layer: Option<HtmlElement>,
    sprites: SecondaryMap<SpiderId, HtmlElement>,
}

impl DomPresenter {
    pub(crate) fn new(document: Document) -> Self {
        Self {
            document,
            layer: None,
            debug_layer: None,
            sprites: SecondaryMap::new(),
        }
    }

    fn div(&self, class: &str) -> Result<HtmlElement> {
        let element = self
            .document
            .create_element("div")
            .map_err(dom_error)?
            .dyn_into::<HtmlElement>()
            .map_err(|_| anyhow!("div is not an HtmlElement"))?;
        if !class.is_empty() {
            element.set_class_name(class);
        }
        Ok(element)
    }

    fn inject_style_once(&self, z_index: i32) -> Result<()> {
        if self.document.get_element_by_id(STYLE_ID).is_some() {
            return Ok(());
        }
        let style = self.document.create_element("style").map_err(dom_error)?;
        style.set_id(STYLE_ID);
        style.set_text_content(Some(&stylesheet(z_index)));
        let head = self.document.head().context("document has no <head>")?;
        head.append_child(&style).map_err(dom_error)?;
        Ok(())
    }

    fn try_mount(&mut self, config: &SpiderConfig) -> Result<()> {
        self.inject_style_once(config.z_index)?;
        let layer = self.div(LAYER_CLASS)?;
        let body = self.document.body().context("document has no <body>")?;
        body.append_child(&layer).map_err(dom_error)?;
        if config.debug {
            let debug = self.div("")?;
            set_styles(
                &debug,
                &[("position", "absolute"), ("inset", "0"), ("pointer-events", "none")],
            )?;
            layer.append_child(&debug).map_err(dom_error)?;
            self.debug_layer = Some(debug);
        }
        self.layer = Some(layer);
        Ok(())
    }

    fn try_create(&mut self, id: SpiderId, width: f64, height: f64) -> Result<()> {
        let layer = self.layer.as_ref().context("spider layer is not mounted")?;
        let element = self.div(SPIDER_CLASS)?;
        element
            .set_attribute(SPIDER_ID_ATTR, &id.data().as_ffi().to_string())
            .map_err(dom_error)?;
        let (width, height) = (format!("{width}px"), format!("{height}px"));
        set_styles(
            &element,
            &[("width", width.as_str()), ("height", height.as_str()), ("opacity", "1")],
        )?;
        let sprite = self.div("sprite")?;
        let image = format!("url(\"{GIF_URL}\")");
        set_styles(
            &sprite,
            &[
                ("background-image", image.as_str()),
                ("background-size", "contain"),
                ("background-repeat", "no-repeat"),
                ("background-position", "center center"),
            ],
        )?;
        element.append_child(&sprite).map_err(dom_error)?;
        layer.append_child(&element).map_err(dom_error)?;
        self.sprites.insert(id, element);
        Ok(())
    }

    fn try_draw_platforms(&self, platforms: &[Platform], viewport: &Viewport) -> Result<()> {
        let Some(debug) = &self.debug_layer else {
            return Ok(());
        };
        debug.set_inner_html("");
        for platform in platforms {
            let line = self.div(DEBUG_LINE_CLASS)?;
            let left = format!("{}px", (platform.x1 - viewport.scroll_x).round());
            let top = format!("{}px", (platform.y - viewport.scroll_y).round());
            let width = format!("{}px", platform.width().round());
            set_styles(
                &line,
                &[("left", left.as_str()), ("top", top.as_str()), ("width", width.as_str())],
            )?;
            debug.append_child(&line).map_err(dom_error)?;
        }
        Ok(())
    }
}

impl Presenter for DomPresenter {
    fn mount(&mut self, config: &SpiderConfig) {
        if let Err(err) = self.try_mount(config) {
            warn!("failed to mount spider layer: {err:#}");
        }
    }

    fn unmount(&mut self) {
        for (_, element) in self.sprites.drain() {
            element.remove();
        }
        if let Some(layer) = self.layer.take() {
            layer.remove();
        }
        self.debug_layer = None;
    }

    fn create(&mut self, id: SpiderId, width: f64, height: f64) {
        if let Err(err) = self.try_create(id, width, height) {
            warn!("failed to create spider sprite: {err:#}");
        }
    }

    fn update(&mut self, id: SpiderId, transform: &Transform) {
        let Some(element) = self.sprites.get(id) else {
            return;
        };
        let style = element.style();
        let _ = style.set_property("transform", &transform_css(transform));
        let _ = style.set_property("opacity", &transform.opacity.to_string());
        if !transform.interactive {
            let _ = style.set_property("pointer-events", "none");
        }
    }

    fn destroy(&mut self, id: SpiderId) {
        if let Some(element) = self.sprites.remove(id) {
            element.remove();
        }
    }

    fn draw_platforms(&mut self, platforms: &[Platform], viewport: &Viewport) {
        if let Err(err) = self.try_draw_platforms(platforms, viewport) {
            warn!("failed to draw platform outlines: {err:#}");
        }
    }
}

fn set_styles(element: &HtmlElement, properties: &[(&str, &str)]) -> Result<()> {
    let style = element.style();
    for (name, value) in properties {
        style.set_property(name, value).map_err(dom_error)?;
    }
    Ok(())
}

pub(crate) fn transform_css(transform: &Transform) -> String {
    format!(
        "translate3d({}px, {}px, 0) scaleX({}) rotate({}deg)",
        transform.translate_x, transform.translate_y, transform.scale_x, transform.rotation_deg
    )
}

fn stylesheet(z_index: i32) -> String {
    format!(
        r#"
.maodie-spider-layer {{
  position: fixed;
  inset: 0;
  width: 100%;
  height: 100%;
  pointer-events: none;
  z-index: {z_index};
  contain: layout style size;
}}
.maodie-spider {{
  position: absolute;
  will-change: transform, opacity;
  pointer-events: auto;
  user-select: none;
  -webkit-user-drag: none;
  transform-origin: 50% 50%;
}}
.maodie-spider .sprite {{
  width: 100%;
  height: 100%;
  display: block;
  pointer-events: none;
  user-select: none;
}}
.maodie-debug-line {{
  position: absolute;
  height: 1px;
  background: rgba(255, 0, 0, 0.35);
  pointer-events: none;
}}
@media (prefers-reduced-motion: reduce) {{
  .maodie-spider {{ transition: none !important; }}
}}
"#
    )
}
