use crate::provider::Eip1193Provider;
use futures::future::LocalBoxFuture;
use std::time::Duration;

/// Path of the ambient provider slot (`window.ethereum`).
pub const AMBIENT_PROVIDER: &[&str] = &["ethereum"];

/// The execution environment wallets inject their providers into.
///
/// In a browser this is the `window` object, see
/// [`WindowEnvironment`](crate::ffi::WindowEnvironment).
pub trait Environment {
    type Provider: Eip1193Provider;

    /// the provider object found at `path` from the global scope, e.g.
    /// `["phantom", "ethereum"]` for `window.phantom.ethereum`
    fn provider_at(&self, path: &[&str]) -> Option<Self::Provider>;

    /// Resolves once the environment announces a late provider injection
    /// (`ethereum#initialized`).
    ///
    /// Dropping the future before it resolved must unregister whatever it
    /// installed to observe the announcement.
    fn injection_signal(&self) -> LocalBoxFuture<'static, ()>;

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;

    /// run a task in the background, used to process provider events
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}
