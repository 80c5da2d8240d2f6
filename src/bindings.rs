//! JavaScript exports
//!
//! Plain functions over `window.localStorage` under the default key. None of
//! them throw.
//!
//! Values are handed to JS through `JSON.parse`, so integers beyond
//! `Number.MAX_SAFE_INTEGER` arrive rounded; the store logs a warning when it
//! writes one.

use wasm_bindgen::prelude::*;

use crate::persistence::PersistedStateStore;
use crate::platform::LocalStorage;
use crate::state::PersistedState;

thread_local! {
    static STORE: PersistedStateStore<LocalStorage> = PersistedStateStore::from_window();
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    // Already initialized when the host page loaded another module first
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Current state as a plain object (`{}` when nothing usable is stored)
#[wasm_bindgen(js_name = getState)]
pub fn get_state() -> JsValue {
    STORE.with(|store| to_js(&store.get()))
}

/// Shallow-merge `partial` into the stored state
#[wasm_bindgen(js_name = updateState)]
pub fn update_state(partial: JsValue) {
    match json_from_js(&partial) {
        Some(value) => STORE.with(|store| store.update_from(&value)),
        None => log::debug!("Ignoring update that can't be encoded as JSON"),
    }
}

/// Remove the stored state
#[wasm_bindgen(js_name = clearState)]
pub fn clear_state() {
    STORE.with(|store| store.clear());
}

/// Call `callback(state)` now and after every write made through these
/// exports. Returns an id for `unsubscribeState`.
#[wasm_bindgen(js_name = subscribeState)]
pub fn subscribe_state(callback: js_sys::Function) -> u32 {
    let id = STORE.with(|store| {
        store.subscribe(move |state| {
            if let Err(err) = callback.call1(&JsValue::NULL, &to_js(state)) {
                log::warn!("State subscriber threw: {:?}", err);
            }
        })
    });
    id.into()
}

#[wasm_bindgen(js_name = unsubscribeState)]
pub fn unsubscribe_state(id: u32) -> bool {
    STORE.with(|store| store.unsubscribe(id.into()))
}

fn to_js(state: &PersistedState) -> JsValue {
    serde_json::to_string(state)
        .ok()
        .and_then(|json| js_sys::JSON::parse(&json).ok())
        .unwrap_or_else(|| js_sys::Object::new().into())
}

/// Encode a JS value as JSON.
///
/// `JSON.stringify` drops `undefined` members, but `{ npub: undefined }`
/// means "clear npub", so they're rewritten to `null` first. Whether the
/// result is an object is left to the store.
fn json_from_js(value: &JsValue) -> Option<serde_json::Value> {
    let replacer =
        js_sys::Function::new_with_args("key, value", "return value === undefined ? null : value");
    let json = js_sys::JSON::stringify_with_replacer(value, &replacer)
        .ok()?
        .as_string()?;
    serde_json::from_str(&json).ok()
}
