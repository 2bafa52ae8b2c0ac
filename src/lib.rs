/// Tab Clear - Chrome extension that closes idle tabs
/// Built with Rust + WASM

pub mod browser;
pub mod classifier;
pub mod domain;
pub mod error;
pub mod eviction;
pub mod history;
pub mod pattern;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod tab_data;

use scheduler::{Action, SchedulerDriver};
use settings::Settings;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

thread_local! {
    static DRIVER: Rc<SchedulerDriver> = Rc::new(browser::chrome_driver());
}

fn driver() -> Rc<SchedulerDriver> {
    DRIVER.with(Rc::clone)
}

fn to_js<T: serde::Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    browser::to_js(value).map_err(|e| JsValue::from_str(&format!("Failed to serialize: {}", e)))
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// chrome.runtime.onInstalled
#[wasm_bindgen]
pub async fn on_installed() -> Result<(), JsValue> {
    driver().on_startup().await.map_err(js_error)
}

/// chrome.alarms.onAlarm; resolves to the pass report, or null when no pass ran
#[wasm_bindgen]
pub async fn on_alarm(name: String) -> Result<JsValue, JsValue> {
    match driver().on_alarm(&name).await {
        Some(report) => to_js(&report),
        None => Ok(JsValue::NULL),
    }
}

/// chrome.runtime.onMessage
#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
    let action: Action =
        serde_wasm_bindgen::from_value(message).map_err(|e| js_error(format!("Unknown message: {}", e)))?;
    let response = driver().handle_action(action).await;
    to_js(&response)
}

#[wasm_bindgen]
pub async fn load_settings() -> Result<JsValue, JsValue> {
    let settings = driver().state().load_settings().await.map_err(js_error)?;
    to_js(&settings)
}

/// Validate and persist the options form; rejects with the validation message
#[wasm_bindgen]
pub async fn save_settings(settings: JsValue) -> Result<JsValue, JsValue> {
    let settings: Settings =
        serde_wasm_bindgen::from_value(settings).map_err(|e| js_error(format!("Invalid settings: {}", e)))?;
    let saved = driver().state().save_user_settings(settings).await.map_err(js_error)?;
    to_js(&saved)
}

/// Resolves to whether auto-closing is now paused
#[wasm_bindgen]
pub async fn toggle_pause() -> Result<bool, JsValue> {
    let driver = driver();
    let now = driver.now();
    driver.state().toggle_pause(now).await.map_err(js_error)
}

/// Closed tabs matching `query`, grouped by category
#[wasm_bindgen]
pub async fn history_groups(query: String) -> Result<JsValue, JsValue> {
    let history = driver().state().load_history().await.map_err(js_error)?;
    to_js(&history.grouped(&query))
}

#[wasm_bindgen]
pub async fn clear_history() -> Result<(), JsValue> {
    driver()
        .state()
        .save_history(&history::History::new())
        .await
        .map_err(js_error)
}

#[wasm_bindgen]
pub async fn load_theme() -> Result<JsValue, JsValue> {
    let theme = driver().state().load_theme().await.map_err(js_error)?;
    to_js(&theme)
}

#[wasm_bindgen]
pub async fn toggle_theme() -> Result<JsValue, JsValue> {
    let theme = driver().state().toggle_theme().await.map_err(js_error)?;
    to_js(&theme)
}

/// Split a textarea into whitelist or blacklist entries
#[wasm_bindgen]
pub fn parse_patterns(text: &str) -> Result<JsValue, JsValue> {
    to_js(&pattern::parse_pattern_lines(text))
}
