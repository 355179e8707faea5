//! Configuration sources layered over the built-in defaults.
//!
//! Precedence, lowest first: defaults, `data-*` attributes on the loading script,
//! `window.MaodieSpiderConfig`, and the object passed to `start()`.

use anyhow::{Context, Result, anyhow};
use js_sys::{Object, Reflect};
use maodie_core::SpiderConfig;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, DomStringMap, HtmlScriptElement, Window};

pub(crate) const WINDOW_CONFIG_KEY: &str = "MaodieSpiderConfig";

pub(crate) fn resolve(window: &Window, explicit: &JsValue) -> Result<SpiderConfig> {
    let mut config = SpiderConfig::default();
    if let Some(document) = window.document()
        && let Some(script) = loading_script(&document)
    {
        apply_dataset(&mut config, &script.dataset());
    }

    let global = Reflect::get(window, &JsValue::from_str(WINDOW_CONFIG_KEY))
        .unwrap_or(JsValue::UNDEFINED);
    let config = overlay(config, &global).context("window.MaodieSpiderConfig is invalid")?;
    let config = overlay(config, explicit).context("start() options are invalid")?;
    config.validate()?;
    Ok(config)
}

/// The script element that loaded us, or the last script on the page once loading is over.
fn loading_script(document: &Document) -> Option<HtmlScriptElement> {
    document.current_script().or_else(|| {
        let scripts = document.scripts();
        let last = scripts.length().checked_sub(1)?;
        scripts.item(last)?.dyn_into::<HtmlScriptElement>().ok()
    })
}

fn apply_dataset(config: &mut SpiderConfig, data: &DomStringMap) {
    let number = |key: &str| data.get(key).as_deref().and_then(parse_number);
    if let Some(count) = number("count") {
        config.count = count.max(0.0) as usize;
    }
    if let Some(scale_min) = number("scaleMin") {
        config.scale_min = scale_min;
    }
    if let Some(scale_max) = number("scaleMax") {
        config.scale_max = scale_max;
    }
    if let Some(z_index) = number("zIndex") {
        config.z_index = z_index as i32;
    }
    if let Some(debug) = data.get("debug") {
        config.debug = parse_flag(&debug);
    }
}

/// Copy the enumerable fields of `value` over `base`. Anything that is not an object
/// leaves `base` untouched.
fn overlay(base: SpiderConfig, value: &JsValue) -> Result<SpiderConfig> {
    let Some(source) = value.dyn_ref::<Object>().filter(|_| value.is_object()) else {
        return Ok(base);
    };
    let target = to_value(&base)
        .map_err(|err| anyhow!("{err}"))?
        .dyn_into::<Object>()
        .map_err(|_| anyhow!("config did not serialize to an object"))?;
    let merged = Object::assign(&target, source);
    from_value(merged.into()).map_err(|err| anyhow!("{err}"))
}

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(raw, "true" | "1")
}
