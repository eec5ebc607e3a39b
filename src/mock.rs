//! In-memory wallet and browser used by the unit tests.

use crate::{
    environment::{AMBIENT_PROVIDER, Environment},
    error::ProviderRpcError,
    provider::{
        Eip1193Provider, EventKind, Listener, ProviderEvent, ProviderFlags, RequestArguments,
        chain_id_to_hex, parse_chain_id,
    },
};
use futures::{
    executor::block_on,
    future::{self, LocalBoxFuture},
};
use serde_json::{Value, json};
use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet, VecDeque},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};

type Response = Result<Value, ProviderRpcError>;

struct Wallet {
    flags: RefCell<HashSet<String>>,
    properties: RefCell<HashSet<String>>,
    providers: Option<Vec<MockProvider>>,
    listeners: RefCell<Vec<Listener>>,
    requests: RefCell<Vec<RequestArguments>>,
    scripted: RefCell<HashMap<&'static str, VecDeque<Response>>>,
    /// accounts the user would approve
    accounts: RefCell<Vec<String>>,
    /// whether the application was granted access already
    authorized: Cell<bool>,
    chain_id: Cell<u64>,
    known_chains: RefCell<HashSet<u64>>,
    /// switch to a chain right after adding it
    switch_on_add: Cell<bool>,
}

/// A scriptable EIP-1193 wallet.
///
/// Without scripted answers it behaves like a well-mannered wallet: it hands
/// out its accounts, switches between the chains it knows and emits
/// `chainChanged` when it does.
#[derive(Clone)]
pub struct MockProvider {
    wallet: Rc<Wallet>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_providers(providers: Vec<MockProvider>) -> Self {
        Self::build(Some(providers))
    }

    fn build(providers: Option<Vec<MockProvider>>) -> Self {
        Self {
            wallet: Rc::new(Wallet {
                flags: RefCell::default(),
                properties: RefCell::default(),
                providers,
                listeners: RefCell::default(),
                requests: RefCell::default(),
                scripted: RefCell::default(),
                accounts: RefCell::default(),
                authorized: Cell::new(false),
                chain_id: Cell::new(1),
                known_chains: RefCell::new(HashSet::from([1])),
                switch_on_add: Cell::new(true),
            }),
        }
    }

    pub fn with_flag(self, flag: &str) -> Self {
        self.wallet.flags.borrow_mut().insert(flag.to_owned());
        self
    }

    pub fn with_property(self, property: &str) -> Self {
        self.wallet.properties.borrow_mut().insert(property.to_owned());
        self
    }

    pub fn with_accounts(self, accounts: &[&str]) -> Self {
        *self.wallet.accounts.borrow_mut() = accounts.iter().map(|a| (*a).to_owned()).collect();
        self
    }

    /// the application was granted access in a previous session
    pub fn authorized(self) -> Self {
        self.wallet.authorized.set(true);
        self
    }

    pub fn on_chain(self, chain_id: u64) -> Self {
        self.wallet.chain_id.set(chain_id);
        self.wallet.known_chains.borrow_mut().insert(chain_id);
        self
    }

    pub fn knows_chain(self, chain_id: u64) -> Self {
        self.wallet.known_chains.borrow_mut().insert(chain_id);
        self
    }

    /// added chains are registered but not switched to
    pub fn stays_on_add(self) -> Self {
        self.wallet.switch_on_add.set(false);
        self
    }

    /// answer the next `method` request with `response`
    pub fn respond(&self, method: &'static str, response: Response) {
        self.wallet
            .scripted
            .borrow_mut()
            .entry(method)
            .or_default()
            .push_back(response);
    }

    pub fn reject(&self, method: &'static str, code: i64) {
        self.respond(method, Err(ProviderRpcError::new(code, format!("{method} failed"))));
    }

    pub fn same(&self, other: &MockProvider) -> bool {
        Rc::ptr_eq(&self.wallet, &other.wallet)
    }

    pub fn chain_id(&self) -> u64 {
        self.wallet.chain_id.get()
    }

    pub fn revoke(&self) {
        self.wallet.authorized.set(false);
    }

    /// the methods requested so far, in order
    pub fn requests(&self) -> Vec<&'static str> {
        self.wallet
            .requests
            .borrow()
            .iter()
            .map(|request| request.method)
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests().into_iter().filter(|m| *m == method).count()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.wallet
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.kind() == kind)
            .count()
    }

    pub fn emit(&self, event: ProviderEvent) {
        let kind = event.kind();
        let listeners: Vec<_> = self
            .wallet
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.kind() == kind)
            .cloned()
            .collect();
        for listener in listeners {
            listener.call(event.clone());
        }
    }

    fn answer(&self, args: &RequestArguments) -> Response {
        if let Some(response) = self
            .wallet
            .scripted
            .borrow_mut()
            .get_mut(args.method)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        let wallet = &self.wallet;
        match args.method {
            "eth_accounts" if wallet.authorized.get() => Ok(json!(wallet.accounts.borrow().clone())),
            "eth_accounts" => Ok(json!([])),
            "eth_requestAccounts" => {
                wallet.authorized.set(true);
                Ok(json!(wallet.accounts.borrow().clone()))
            }
            "eth_chainId" => Ok(json!(chain_id_to_hex(wallet.chain_id.get()))),
            "wallet_requestPermissions" => Ok(json!([{
                "parentCapability": "eth_accounts",
                "caveats": [{
                    "type": "restrictReturnedAccounts",
                    "value": wallet.accounts.borrow().clone(),
                }],
            }])),
            "wallet_switchEthereumChain" => {
                let chain_id = requested_chain(args)?;
                if !wallet.known_chains.borrow().contains(&chain_id) {
                    return Err(ProviderRpcError::new(4902, "Unrecognized chain ID."));
                }
                self.switch_to(chain_id);
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let chain_id = requested_chain(args)?;
                wallet.known_chains.borrow_mut().insert(chain_id);
                if wallet.switch_on_add.get() {
                    self.switch_to(chain_id);
                }
                Ok(Value::Null)
            }
            method => Err(ProviderRpcError::new(
                4200,
                format!("unsupported method {method}"),
            )),
        }
    }

    fn switch_to(&self, chain_id: u64) {
        self.wallet.chain_id.set(chain_id);
        self.emit(ProviderEvent::ChainChanged(chain_id_to_hex(chain_id)));
    }
}

fn requested_chain(args: &RequestArguments) -> Result<u64, ProviderRpcError> {
    args.params
        .as_ref()
        .and_then(|params| params.get(0))
        .and_then(|param| param.get("chainId"))
        .and_then(parse_chain_id)
        .ok_or_else(|| ProviderRpcError::new(-32602, "missing chainId"))
}

impl ProviderFlags for MockProvider {
    fn flag(&self, name: &str) -> bool {
        self.wallet.flags.borrow().contains(name)
    }

    fn has_property(&self, name: &str) -> bool {
        self.flag(name) || self.wallet.properties.borrow().contains(name)
    }
}

impl Eip1193Provider for MockProvider {
    fn request(&self, args: RequestArguments) -> LocalBoxFuture<'static, Response> {
        let response = self.answer(&args);
        self.wallet.requests.borrow_mut().push(args);
        Box::pin(future::ready(response))
    }

    fn on(&self, listener: &Listener) {
        self.wallet.listeners.borrow_mut().push(listener.clone());
    }

    fn remove_listener(&self, listener: &Listener) {
        self.wallet
            .listeners
            .borrow_mut()
            .retain(|registered| registered != listener);
    }

    fn providers(&self) -> Option<Vec<Self>> {
        self.wallet.providers.clone()
    }
}

#[derive(Default)]
struct Browser {
    globals: RefCell<HashMap<Vec<String>, MockProvider>>,
    pending_injection: RefCell<Option<MockProvider>>,
    injection_listeners: Cell<usize>,
    slept: RefCell<Vec<Duration>>,
    spawned: RefCell<VecDeque<LocalBoxFuture<'static, ()>>>,
}

/// A synthetic `window`.
#[derive(Clone, Default)]
pub struct MockEnvironment {
    browser: Rc<Browser>,
}

impl MockEnvironment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_ethereum(provider: MockProvider) -> Self {
        Self::empty().with_provider(AMBIENT_PROVIDER, provider)
    }

    pub fn with_provider(self, path: &[&str], provider: MockProvider) -> Self {
        self.browser
            .globals
            .borrow_mut()
            .insert(path.iter().map(|p| (*p).to_owned()).collect(), provider);
        self
    }

    /// inject `provider` in `window.ethereum` and announce it on the next
    /// injection signal
    pub fn inject_on_signal(&self, provider: MockProvider) {
        *self.browser.pending_injection.borrow_mut() = Some(provider);
    }

    pub fn pending_injection_listeners(&self) -> usize {
        self.browser.injection_listeners.get()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.browser.slept.borrow().clone()
    }

    /// run the spawned tasks, including those they spawn, to completion
    pub fn run_spawned(&self) {
        loop {
            let task = self.browser.spawned.borrow_mut().pop_front();
            match task {
                Some(task) => block_on(task),
                None => break,
            }
        }
    }
}

struct InjectionSignal {
    browser: Rc<Browser>,
}

impl Future for InjectionSignal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let injected = self.browser.pending_injection.borrow_mut().take();
        match injected {
            Some(provider) => {
                self.browser
                    .globals
                    .borrow_mut()
                    .insert(vec!["ethereum".to_owned()], provider);
                Poll::Ready(())
            }
            None => Poll::Pending,
        }
    }
}

impl Drop for InjectionSignal {
    fn drop(&mut self) {
        let listeners = self.browser.injection_listeners.get();
        self.browser.injection_listeners.set(listeners - 1);
    }
}

impl Environment for MockEnvironment {
    type Provider = MockProvider;

    fn provider_at(&self, path: &[&str]) -> Option<MockProvider> {
        let path: Vec<String> = path.iter().map(|p| (*p).to_owned()).collect();
        self.browser.globals.borrow().get(&path).cloned()
    }

    fn injection_signal(&self) -> LocalBoxFuture<'static, ()> {
        let listeners = self.browser.injection_listeners.get();
        self.browser.injection_listeners.set(listeners + 1);
        Box::pin(InjectionSignal {
            browser: self.browser.clone(),
        })
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let browser = self.browser.clone();
        Box::pin(async move {
            browser.slept.borrow_mut().push(duration);
        })
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        self.browser.spawned.borrow_mut().push_back(task);
    }
}
