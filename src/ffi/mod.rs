//! Bindings to the browser: the provider object a wallet injects, `window`
//! and its `localStorage`.

mod eip1193;
mod window;

pub use self::{
    eip1193::{Eip1193, JsProvider},
    window::{INITIALIZED_EVENT, LocalStorage, WindowEnvironment},
};
