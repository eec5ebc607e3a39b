use alloy_primitives::Address;
use futures::channel::oneshot;
use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

/// What the connector tells the application about.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectorEvent {
    #[serde(rename_all = "camelCase")]
    Connect { accounts: Vec<Address>, chain_id: u64 },
    Disconnect,
    #[serde(rename_all = "camelCase")]
    Change {
        #[serde(skip_serializing_if = "Option::is_none")]
        accounts: Option<Vec<Address>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chain_id: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorEventKind {
    Connect,
    Disconnect,
    Change,
}

impl ConnectorEvent {
    pub fn kind(&self) -> ConnectorEventKind {
        match self {
            ConnectorEvent::Connect { .. } => ConnectorEventKind::Connect,
            ConnectorEvent::Disconnect => ConnectorEventKind::Disconnect,
            ConnectorEvent::Change { .. } => ConnectorEventKind::Change,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: ConnectorEventKind,
    once: bool,
    callback: Rc<dyn Fn(&ConnectorEvent)>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Application-side event bus the connector reports to.
///
/// Cloning the emitter gives another handle on the same subscriptions.
#[derive(Clone, Default)]
pub struct Emitter {
    registry: Rc<RefCell<Registry>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(
        &self,
        kind: ConnectorEventKind,
        once: bool,
        callback: Rc<dyn Fn(&ConnectorEvent)>,
    ) -> SubscriptionId {
        let mut registry = self.registry.borrow_mut();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.subscriptions.push(Subscription {
            id,
            kind,
            once,
            callback,
        });
        id
    }

    pub fn on(
        &self,
        kind: ConnectorEventKind,
        callback: impl Fn(&ConnectorEvent) + 'static,
    ) -> SubscriptionId {
        self.subscribe(kind, false, Rc::new(callback))
    }

    /// the callback is removed after the first event it receives
    pub fn once(
        &self,
        kind: ConnectorEventKind,
        callback: impl Fn(&ConnectorEvent) + 'static,
    ) -> SubscriptionId {
        self.subscribe(kind, true, Rc::new(callback))
    }

    /// returns `false` if the subscription was already gone
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let before = registry.subscriptions.len();
        registry.subscriptions.retain(|subscription| subscription.id != id);
        registry.subscriptions.len() != before
    }

    pub fn listener_count(&self, kind: ConnectorEventKind) -> usize {
        self.registry
            .borrow()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.kind == kind)
            .count()
    }

    pub fn emit(&self, event: ConnectorEvent) {
        let kind = event.kind();
        tracing::debug!(?event, "emit");

        // callbacks may subscribe or unsubscribe, don't hold the registry
        let callbacks: Vec<_> = {
            let mut registry = self.registry.borrow_mut();
            let callbacks = registry
                .subscriptions
                .iter()
                .filter(|subscription| subscription.kind == kind)
                .map(|subscription| subscription.callback.clone())
                .collect();
            registry
                .subscriptions
                .retain(|subscription| !(subscription.once && subscription.kind == kind));
            callbacks
        };

        for callback in callbacks {
            callback(&event);
        }
    }

    /// Resolves on the first `change` event reporting `chain_id`.
    ///
    /// The subscription is taken immediately, so a change emitted before the
    /// returned future is first polled is not missed.
    pub fn wait_for_chain(&self, chain_id: u64) -> ChainConfirmation {
        let (sender, receiver) = oneshot::channel();
        let sender = RefCell::new(Some(sender));
        let id = self.on(ConnectorEventKind::Change, move |event| {
            if let ConnectorEvent::Change {
                chain_id: Some(changed),
                ..
            } = event
                && *changed == chain_id
                && let Some(sender) = sender.borrow_mut().take()
            {
                let _ = sender.send(());
            }
        });

        ChainConfirmation {
            emitter: self.clone(),
            id,
            receiver,
        }
    }
}

/// See [`Emitter::wait_for_chain`].
pub struct ChainConfirmation {
    emitter: Emitter,
    id: SubscriptionId,
    receiver: oneshot::Receiver<()>,
}

impl Future for ChainConfirmation {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(_) => {
                self.emitter.off(self.id);
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ChainConfirmation {
    fn drop(&mut self) {
        self.emitter.off(self.id);
    }
}
