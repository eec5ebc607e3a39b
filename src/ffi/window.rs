use super::eip1193::{Callbacks, JsProvider};
use crate::{
    environment::Environment,
    storage::{Storage, StorageError},
};
use futures::{
    FutureExt as _,
    channel::oneshot,
    future::{self, LocalBoxFuture},
};
use js_sys::Reflect;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use wasm_bindgen::{JsCast as _, prelude::*};

/// Dispatched on `window` by MetaMask once it injected `window.ethereum`.
pub const INITIALIZED_EVENT: &str = "ethereum#initialized";

/// The browser [`Environment`], backed by the global `window`.
#[derive(Clone)]
pub struct WindowEnvironment {
    window: web_sys::Window,
    callbacks: Callbacks,
}

impl WindowEnvironment {
    /// `None` when not running in a browser main thread
    pub fn new() -> Option<Self> {
        web_sys::window().map(|window| Self {
            window,
            callbacks: Callbacks::default(),
        })
    }
}

struct InjectionSignal {
    window: web_sys::Window,
    received: oneshot::Receiver<()>,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl Future for InjectionSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.received.poll_unpin(cx).map(|_| ())
    }
}

impl Drop for InjectionSignal {
    fn drop(&mut self) {
        let _ = self.window.remove_event_listener_with_callback(
            INITIALIZED_EVENT,
            self.callback.as_ref().unchecked_ref(),
        );
    }
}

impl Environment for WindowEnvironment {
    type Provider = JsProvider;

    fn provider_at(&self, path: &[&str]) -> Option<JsProvider> {
        let mut value: JsValue = self.window.clone().into();
        for segment in path {
            value = Reflect::get(&value, &JsValue::from_str(segment)).ok()?;
            if value.is_undefined() || value.is_null() {
                return None;
            }
        }
        value
            .is_object()
            .then(|| JsProvider::new(value.unchecked_into(), self.callbacks.clone()))
    }

    fn injection_signal(&self) -> LocalBoxFuture<'static, ()> {
        let (sender, received) = oneshot::channel();
        let mut sender = Some(sender);
        let callback = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event| {
            if let Some(sender) = sender.take() {
                let _ = sender.send(());
            }
        });

        if let Err(error) = self
            .window
            .add_event_listener_with_callback(INITIALIZED_EVENT, callback.as_ref().unchecked_ref())
        {
            tracing::warn!(?error, "cannot listen to {INITIALIZED_EVENT}");
            return Box::pin(future::pending());
        }

        Box::pin(InjectionSignal {
            window: self.window.clone(),
            received,
            callback,
        })
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        Box::pin(gloo_timers::future::sleep(duration))
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

/// [`Storage`] over the browser's `window.localStorage`.
#[derive(Clone)]
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    /// `None` if the browser denies access to `localStorage`
    pub fn new() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok().flatten()?;
        Some(Self { storage })
    }
}

fn storage_error(key: &str, error: JsValue) -> StorageError {
    StorageError {
        key: key.to_owned(),
        info: error.as_string().unwrap_or_else(|| format!("{error:?}")),
    }
}

impl Storage for LocalStorage {
    fn get_item<'a>(
        &'a self,
        key: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<String>, StorageError>> {
        let value = self
            .storage
            .get_item(key)
            .map_err(|error| storage_error(key, error));
        Box::pin(future::ready(value))
    }

    fn set_item<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        let result = self
            .storage
            .set_item(key, value)
            .map_err(|error| storage_error(key, error));
        Box::pin(future::ready(result))
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        let result = self
            .storage
            .remove_item(key)
            .map_err(|error| storage_error(key, error));
        Box::pin(future::ready(result))
    }
}
