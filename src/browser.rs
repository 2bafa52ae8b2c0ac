/// Chrome extension APIs behind the storage, tab, alarm and HTTP seams

use crate::classifier::oracle::{HttpResponse, HttpTransport};
use crate::error::{BrowserError, OracleError, StorageError};
use crate::eviction::TabControl;
use crate::scheduler::{Clock, SchedulerDriver, Timer};
use crate::storage::Storage;
use crate::tab_data::Tab;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, Response, WorkerGlobalScope};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    async fn storage_get(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    async fn storage_set(items: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    async fn tabs_query(query: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = remove)]
    async fn tabs_remove(tab_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "alarms"], js_name = create)]
    async fn alarms_create(name: &str, info: JsValue) -> Result<JsValue, JsValue>;
}

/// Convert to a plain JS value; maps become objects, not `Map`s
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

/// chrome.storage.local
pub struct ChromeStorage;

#[async_trait(?Send)]
impl Storage for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let items = storage_get(key).await.map_err(|e| StorageError::Read {
            key: key.to_string(),
            message: format!("{:?}", e),
        })?;

        let value = js_sys::Reflect::get(&items, &JsValue::from_str(key)).map_err(|e| StorageError::Read {
            key: key.to_string(),
            message: format!("{:?}", e),
        })?;
        if value.is_undefined() {
            return Ok(None);
        }

        serde_wasm_bindgen::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Decode {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let write_error = |message: String| StorageError::Write {
            key: key.to_string(),
            message,
        };

        let js_value = to_js(&value).map_err(|e| write_error(e.to_string()))?;
        let items = js_sys::Object::new();
        js_sys::Reflect::set(&items, &JsValue::from_str(key), &js_value)
            .map_err(|e| write_error(format!("{:?}", e)))?;

        storage_set(items.into())
            .await
            .map(|_| ())
            .map_err(|e| write_error(format!("{:?}", e)))
    }
}

/// chrome.tabs across every window
pub struct ChromeTabs;

#[async_trait(?Send)]
impl TabControl for ChromeTabs {
    async fn query_all(&self) -> Result<Vec<Tab>, BrowserError> {
        let tabs = tabs_query(js_sys::Object::new().into())
            .await
            .map_err(|e| BrowserError::Query(format!("{:?}", e)))?;

        serde_wasm_bindgen::from_value(tabs).map_err(|e| BrowserError::Query(format!("Failed to parse tabs: {}", e)))
    }

    async fn remove(&self, tab_id: i32) -> Result<(), BrowserError> {
        tabs_remove(tab_id)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Remove {
                tab_id,
                message: format!("{:?}", e),
            })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlarmInfo {
    period_in_minutes: f64,
}

/// chrome.alarms
pub struct ChromeAlarms;

#[async_trait(?Send)]
impl Timer for ChromeAlarms {
    async fn schedule(&self, name: &str, period_minutes: f64) -> Result<(), BrowserError> {
        let schedule_error = |message: String| BrowserError::Schedule {
            name: name.to_string(),
            message,
        };

        let info = to_js(&AlarmInfo {
            period_in_minutes: period_minutes,
        })
        .map_err(|e| schedule_error(e.to_string()))?;

        alarms_create(name, info)
            .await
            .map(|_| ())
            .map_err(|e| schedule_error(format!("{:?}", e)))
    }
}

/// `fetch` from the extension service worker
pub struct FetchTransport;

#[async_trait(?Send)]
impl HttpTransport for FetchTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, OracleError> {
        let network = |e: JsValue| OracleError::Network(format!("{:?}", e));

        let init = RequestInit::new();
        init.set_method("POST");
        init.set_body(&JsValue::from_str(&body));

        let request = Request::new_with_str_and_init(url, &init).map_err(network)?;
        for (name, value) in headers {
            request.headers().set(name, value).map_err(network)?;
        }

        let scope: WorkerGlobalScope = js_sys::global().unchecked_into();
        let response: Response = JsFuture::from(scope.fetch_with_request(&request))
            .await
            .map_err(network)?
            .unchecked_into();

        let text = JsFuture::from(response.text().map_err(network)?)
            .await
            .map_err(network)?;

        Ok(HttpResponse {
            status: response.status(),
            body: text.as_string().unwrap_or_default(),
        })
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }
}

/// Driver wired to the live browser
pub fn chrome_driver() -> SchedulerDriver {
    SchedulerDriver::new(
        Box::new(ChromeStorage),
        Box::new(ChromeTabs),
        Box::new(ChromeAlarms),
        Box::new(FetchTransport),
        Box::new(SystemClock),
    )
}
