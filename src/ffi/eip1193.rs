use crate::{
    error::ProviderRpcError,
    provider::{
        Eip1193Provider, EventKind, Listener, ProviderEvent, ProviderFlags, RequestArguments,
    },
};
use futures::future::LocalBoxFuture;
use js_sys::{Array, Reflect};
use serde::Serialize as _;
use serde_json::Value;
use std::{cell::RefCell, collections::HashMap, rc::Rc};
use wasm_bindgen::{JsCast as _, prelude::*};

#[wasm_bindgen]
extern "C" {
    /// An EIP-1193 provider object, as injected by the wallet extensions.
    #[derive(Debug, Clone, PartialEq)]
    pub type Eip1193;

    /// Submit a JSON-RPC request `{ method, params }` to the wallet.
    #[wasm_bindgen(method, catch)]
    pub async fn request(this: &Eip1193, args: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method)]
    pub fn on(this: &Eip1193, event: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = "removeListener")]
    pub fn remove_listener(this: &Eip1193, event: &str, listener: &js_sys::Function);

    /// Set when several wallets share `window.ethereum`.
    #[wasm_bindgen(method, getter)]
    pub fn providers(this: &Eip1193) -> JsValue;
}

/// The JS callbacks currently registered on providers, by [`Listener`] id.
///
/// Providers are looked up again on every connector call, so the handles on
/// the same JS object share this registry to be able to remove a callback
/// registered through another handle.
pub(crate) type Callbacks = Rc<RefCell<HashMap<u64, Closure<dyn Fn(JsValue)>>>>;

#[derive(Clone)]
pub struct JsProvider {
    raw: Eip1193,
    callbacks: Callbacks,
}

impl JsProvider {
    pub(crate) fn new(raw: Eip1193, callbacks: Callbacks) -> Self {
        Self { raw, callbacks }
    }

    pub fn raw(&self) -> &Eip1193 {
        &self.raw
    }
}

fn decode_error(error: JsValue) -> ProviderRpcError {
    serde_wasm_bindgen::from_value(error).unwrap_or_else(|decode_error| {
        ProviderRpcError::new(
            -32603,
            format!("Couldn't decode the error content: {decode_error}"),
        )
    })
}

fn decode_event(kind: EventKind, payload: JsValue) -> Result<ProviderEvent, String> {
    let payload: Value =
        serde_wasm_bindgen::from_value(payload).map_err(|error| error.to_string())?;
    ProviderEvent::decode(kind, payload).map_err(|error| error.to_string())
}

impl ProviderFlags for JsProvider {
    fn flag(&self, name: &str) -> bool {
        Reflect::get(&self.raw, &JsValue::from_str(name))
            .ok()
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn has_property(&self, name: &str) -> bool {
        Reflect::has(&self.raw, &JsValue::from_str(name)).unwrap_or(false)
    }
}

impl Eip1193Provider for JsProvider {
    fn request(&self, args: RequestArguments) -> LocalBoxFuture<'static, Result<Value, ProviderRpcError>> {
        let raw = self.raw.clone();
        Box::pin(async move {
            let method = args.method;
            let args = args
                .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
                .map_err(|error| {
                    ProviderRpcError::new(-32603, format!("Couldn't encode `{method}': {error}"))
                })?;

            match raw.request(args).await {
                Ok(result) => serde_wasm_bindgen::from_value(result).map_err(|decode_error| {
                    ProviderRpcError::new(
                        -32603,
                        format!("Couldn't decode the answer to `{method}': {decode_error}"),
                    )
                }),
                Err(error) => Err(decode_error(error)),
            }
        })
    }

    fn on(&self, listener: &Listener) {
        let mut callbacks = self.callbacks.borrow_mut();
        if callbacks.contains_key(&listener.id()) {
            return;
        }

        let kind = listener.kind();
        let target = listener.clone();
        let callback = Closure::<dyn Fn(JsValue)>::new(move |payload: JsValue| {
            match decode_event(kind, payload) {
                Ok(event) => target.call(event),
                Err(error) => tracing::warn!(%kind, %error, "undecodable provider event"),
            }
        });
        self.raw
            .on(kind.as_str(), callback.as_ref().unchecked_ref());
        callbacks.insert(listener.id(), callback);
    }

    fn remove_listener(&self, listener: &Listener) {
        let callback = self.callbacks.borrow_mut().remove(&listener.id());
        if let Some(callback) = callback {
            self.raw
                .remove_listener(listener.kind().as_str(), callback.as_ref().unchecked_ref());
        }
    }

    fn providers(&self) -> Option<Vec<Self>> {
        let providers = self.raw.providers();
        if !Array::is_array(&providers) {
            return None;
        }
        let providers = Array::from(&providers)
            .iter()
            .filter(|provider| provider.is_object())
            .map(|provider| Self::new(provider.unchecked_into(), self.callbacks.clone()))
            .collect();
        Some(providers)
    }
}
