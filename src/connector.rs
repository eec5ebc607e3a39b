use crate::{
    chain::{AddEthereumChainOverrides, AddEthereumChainParameter, Chain},
    emitter::{ConnectorEvent, ConnectorEventKind, Emitter},
    environment::Environment,
    error::{ConnectorError, ProviderRpcError, RpcErrorCode},
    inject::{self, AsyncInject},
    provider::{
        Eip1193Provider, EventKind, Listener, ProviderEvent, Requests, chain_id_to_hex,
        checksum_address, parse_chain_id_str,
    },
    shim::DisconnectShim,
    state::{ConnectionState, ListenerSet, StateEvent, transition},
    storage::Storage,
    target::{self, Target, TargetDescriptor},
};
use alloy_primitives::Address;
use futures::{FutureExt as _, future};
use std::{
    cell::{Cell, OnceCell},
    future::Future,
    rc::{Rc, Weak},
    time::Duration,
};

/// `eth_accounts` is retried this many times by [`InjectedConnector::is_authorized`]
const RETRY_COUNT: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Constructor-time options of an [`InjectedConnector`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InjectedParameters {
    /// remember an application-requested disconnect in storage
    pub shim_disconnect: bool,
    #[serde(rename = "unstable_shimAsyncInject")]
    pub unstable_shim_async_inject: AsyncInject,
    #[serde(skip)]
    pub target: Option<Target>,
}

impl Default for InjectedParameters {
    fn default() -> Self {
        Self {
            shim_disconnect: true,
            unstable_shim_async_inject: AsyncInject::Disabled,
            target: None,
        }
    }
}

impl InjectedParameters {
    pub fn target(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectParameters {
    /// switch to this chain once connected
    pub chain_id: Option<u64>,
    /// restore a previous session: use the accounts already exposed and
    /// never prompt the user
    pub is_reconnecting: bool,
}

impl ConnectParameters {
    pub fn chain(chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainParameters {
    pub chain_id: u64,
    #[serde(default)]
    pub add_ethereum_chain_parameter: Option<AddEthereumChainOverrides>,
}

impl SwitchChainParameters {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            add_ethereum_chain_parameter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub accounts: Vec<Address>,
    pub chain_id: u64,
}

/// `id` and display name of a connector, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectorIdentity {
    pub id: String,
    pub name: String,
}

struct Listeners {
    connect: Listener,
    disconnect: Listener,
    accounts_changed: Listener,
    chain_changed: Listener,
}

impl Listeners {
    fn new<E: Environment + 'static>(inner: &Weak<Inner<E>>) -> Self {
        let weak = inner.clone();
        let connect = Listener::new(EventKind::Connect, move |event| {
            let ProviderEvent::Connect { chain_id } = event else {
                return;
            };
            spawn_handler(&weak, move |connector| async move {
                if let Err(error) = connector.on_connect(&chain_id).await {
                    tracing::warn!(%error, "failed to process the provider's connect event");
                }
            });
        });

        let weak = inner.clone();
        let disconnect = Listener::new(EventKind::Disconnect, move |event| {
            let ProviderEvent::Disconnect(error) = event else {
                return;
            };
            spawn_handler(&weak, move |connector| async move {
                connector.on_disconnect(error.as_ref()).await;
            });
        });

        let weak = inner.clone();
        let accounts_changed = Listener::new(EventKind::AccountsChanged, move |event| {
            let ProviderEvent::AccountsChanged(accounts) = event else {
                return;
            };
            spawn_handler(&weak, move |connector| async move {
                if let Err(error) = connector.on_accounts_changed(&accounts).await {
                    tracing::warn!(%error, "failed to process the provider's accountsChanged event");
                }
            });
        });

        let weak = inner.clone();
        let chain_changed = Listener::new(EventKind::ChainChanged, move |event| {
            let ProviderEvent::ChainChanged(chain) = event else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                InjectedConnector { inner }.on_chain_changed(&chain);
            }
        });

        Self {
            connect,
            disconnect,
            accounts_changed,
            chain_changed,
        }
    }

    fn get(&self, kind: EventKind) -> &Listener {
        match kind {
            EventKind::Connect => &self.connect,
            EventKind::Disconnect => &self.disconnect,
            EventKind::AccountsChanged => &self.accounts_changed,
            EventKind::ChainChanged => &self.chain_changed,
        }
    }
}

fn spawn_handler<E, F, Fut>(inner: &Weak<Inner<E>>, handler: F)
where
    E: Environment + 'static,
    F: FnOnce(InjectedConnector<E>) -> Fut,
    Fut: Future<Output = ()> + 'static,
{
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let connector = InjectedConnector { inner };
    if let Some(environment) = connector.inner.environment.as_ref() {
        environment.spawn_local(Box::pin(handler(connector.clone())));
    }
}

struct Inner<E: Environment> {
    parameters: InjectedParameters,
    environment: Option<E>,
    chains: Vec<Chain>,
    storage: Option<Rc<dyn Storage>>,
    emitter: Emitter,
    identity: OnceCell<ConnectorIdentity>,
    state: Cell<ConnectionState>,
    attached: Cell<ListenerSet>,
    listeners: Listeners,
}

/// Connector for a wallet that injected an EIP-1193 provider in the page.
///
/// Nothing about the connection is cached: the provider is looked up again
/// on every call and the connection status is rebuilt from the disconnect
/// flag and the provider's answers.
pub struct InjectedConnector<E: Environment> {
    inner: Rc<Inner<E>>,
}

impl<E: Environment> Clone for InjectedConnector<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Environment + 'static> InjectedConnector<E> {
    pub const TYPE: &'static str = "injected";

    /// `environment` is `None` outside of a browser, the connector then never
    /// finds a provider.
    pub fn new(
        parameters: InjectedParameters,
        environment: Option<E>,
        chains: Vec<Chain>,
        storage: Option<Rc<dyn Storage>>,
        emitter: Emitter,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak| Inner {
            parameters,
            environment,
            chains,
            storage,
            emitter,
            identity: OnceCell::new(),
            state: Cell::new(ConnectionState::Disconnected),
            attached: Cell::new(ListenerSet::EMPTY),
            listeners: Listeners::new(weak),
        });
        Self { inner }
    }

    fn descriptor(&self) -> TargetDescriptor {
        target::descriptor(self.inner.parameters.target.as_ref())
    }

    pub fn identity(&self) -> &ConnectorIdentity {
        self.inner.identity.get_or_init(|| {
            let descriptor = self.descriptor();
            ConnectorIdentity {
                id: descriptor.id.into_owned(),
                name: descriptor.name.into_owned(),
            }
        })
    }

    pub fn id(&self) -> &str {
        &self.identity().id
    }

    pub fn name(&self) -> &str {
        &self.identity().name
    }

    pub fn emitter(&self) -> &Emitter {
        &self.inner.emitter
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    fn shim(&self) -> DisconnectShim {
        DisconnectShim::new(self.id(), self.inner.storage.clone())
    }

    pub fn get_provider(&self) -> Option<E::Provider> {
        target::locate(
            self.inner.environment.as_ref(),
            self.inner.parameters.target.as_ref(),
        )
    }

    fn require_provider(&self) -> Result<E::Provider, ConnectorError> {
        self.get_provider().ok_or(ConnectorError::ProviderNotFound)
    }

    /// Run the transition for `event` and bring the provider's listeners in
    /// line with the resulting state.
    fn apply(&self, provider: &E::Provider, event: StateEvent) {
        let state = self.inner.state.get();
        let attached = self.inner.attached.get();
        let (next, delta) = transition(state, event, attached);

        for kind in delta.detach.iter() {
            provider.remove_listener(self.inner.listeners.get(kind));
        }
        for kind in delta.attach.iter() {
            provider.on(self.inner.listeners.get(kind));
        }

        self.inner.attached.set(delta.apply(attached));
        self.inner.state.set(next);
        if state != next {
            tracing::debug!(connector = self.id(), from = %state, to = %next, "connection state");
        }
    }

    /// wait for the provider's first `connect` event
    pub fn setup(&self) {
        if let Some(provider) = self.get_provider() {
            self.apply(&provider, StateEvent::Setup);
        }
    }

    pub async fn connect(
        &self,
        parameters: ConnectParameters,
    ) -> Result<ConnectionResult, ConnectorError> {
        let provider = self.require_provider()?;

        let previous = self.inner.state.get();
        self.apply(&provider, StateEvent::ConnectRequested);
        match self.establish(&provider, parameters).await {
            Ok(result) => {
                tracing::debug!(connector = self.id(), chain_id = result.chain_id, "connected");
                Ok(result)
            }
            Err(error) => {
                self.apply(&provider, StateEvent::Failed(previous));
                Err(error.classify())
            }
        }
    }

    async fn establish(
        &self,
        provider: &E::Provider,
        parameters: ConnectParameters,
    ) -> Result<ConnectionResult, ConnectorError> {
        let requests = Requests::new(provider);
        let shim_disconnect = self.inner.parameters.shim_disconnect;

        let mut accounts = Vec::new();
        if parameters.is_reconnecting {
            accounts = requests.eth_accounts().await.unwrap_or_default();
        } else if shim_disconnect
            && self.descriptor().supports_account_selection
            && !self.shim().is_connected().await.unwrap_or(false)
        {
            accounts = self.select_accounts(&requests).await?;
        }

        if accounts.is_empty() && !parameters.is_reconnecting {
            accounts = requests.eth_request_accounts().await?;
        }
        if accounts.is_empty() {
            return Err(ConnectorError::invalid_response(
                "eth_requestAccounts",
                "no account was exposed",
            ));
        }

        self.apply(provider, StateEvent::Established);

        let mut chain_id = requests.eth_chain_id().await?;
        if let Some(requested) = parameters.chain_id
            && requested != chain_id
        {
            match self
                .switch_chain_with(provider, SwitchChainParameters::new(requested))
                .await
            {
                Ok(chain) => chain_id = chain.id,
                Err(error) if error.is_user_rejection() => return Err(error),
                Err(error) => {
                    tracing::warn!(%error, chain_id, requested, "keeping the current chain");
                }
            }
        }

        if shim_disconnect {
            self.shim().set_connected().await?;
        }

        Ok(ConnectionResult { accounts, chain_id })
    }

    /// After a simulated disconnect the wallet still exposes the previously
    /// granted accounts. Ask for the permission again so the user gets to pick.
    async fn select_accounts(
        &self,
        requests: &Requests<'_, E::Provider>,
    ) -> Result<Vec<Address>, ConnectorError> {
        let granted = requests.eth_accounts().await.unwrap_or_default();
        if granted.is_empty() {
            return Ok(granted);
        }

        match requests.wallet_request_permissions().await {
            Ok(accounts) => Ok(accounts),
            Err(error)
                if matches!(
                    error.code(),
                    Some(RpcErrorCode::UserRejectedRequest | RpcErrorCode::ResourceUnavailable)
                ) =>
            {
                Err(error)
            }
            Err(error) => {
                tracing::debug!(%error, "account selection unavailable");
                Ok(Vec::new())
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        let provider = self.require_provider()?;

        self.apply(&provider, StateEvent::Disconnected);
        if self.inner.parameters.shim_disconnect {
            self.shim().clear().await?;
        }
        Ok(())
    }

    pub async fn get_accounts(&self) -> Result<Vec<Address>, ConnectorError> {
        let provider = self.require_provider()?;
        Requests::new(&provider).eth_accounts().await
    }

    pub async fn get_chain_id(&self) -> Result<u64, ConnectorError> {
        let provider = self.require_provider()?;
        Requests::new(&provider).eth_chain_id().await
    }

    /// `true` if the wallet exposes accounts to the application and the
    /// application did not disconnect. Never fails.
    pub async fn is_authorized(&self) -> bool {
        match self.check_authorized().await {
            Ok(authorized) => authorized,
            Err(error) => {
                tracing::debug!(connector = self.id(), %error, "not authorized");
                false
            }
        }
    }

    async fn check_authorized(&self) -> Result<bool, ConnectorError> {
        if self.inner.parameters.shim_disconnect && !self.shim().is_connected().await? {
            return Ok(false);
        }

        let provider = match self.get_provider() {
            Some(provider) => provider,
            None => {
                let (Some(environment), Some(timeout)) = (
                    self.inner.environment.as_ref(),
                    self.inner.parameters.unstable_shim_async_inject.timeout(),
                ) else {
                    return Err(ConnectorError::ProviderNotFound);
                };
                inject::detect(environment, &self.descriptor(), timeout)
                    .await
                    .ok_or(ConnectorError::ProviderNotFound)?
            }
        };

        let accounts = self.accounts_with_retry(&provider).await?;
        Ok(!accounts.is_empty())
    }

    async fn accounts_with_retry(
        &self,
        provider: &E::Provider,
    ) -> Result<Vec<Address>, ConnectorError> {
        let requests = Requests::new(provider);
        let mut attempt = 0;
        loop {
            match requests.eth_accounts().await {
                Ok(accounts) => return Ok(accounts),
                Err(error) if attempt < RETRY_COUNT => {
                    let delay = RETRY_DELAY * (1 << attempt);
                    tracing::debug!(%error, ?delay, "retrying eth_accounts");
                    if let Some(environment) = self.inner.environment.as_ref() {
                        environment.sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub async fn switch_chain(
        &self,
        parameters: SwitchChainParameters,
    ) -> Result<Chain, ConnectorError> {
        let provider = self.require_provider()?;
        self.switch_chain_with(&provider, parameters).await
    }

    async fn switch_chain_with(
        &self,
        provider: &E::Provider,
        parameters: SwitchChainParameters,
    ) -> Result<Chain, ConnectorError> {
        let Some(chain) = self
            .inner
            .chains
            .iter()
            .find(|chain| chain.id == parameters.chain_id)
            .cloned()
        else {
            return Err(ConnectorError::SwitchChain(Box::new(
                ConnectorError::ChainNotConfigured,
            )));
        };

        let requests = Requests::new(provider);

        // the wallet may accept the request before actually changing chain,
        // wait for the change to be reported as well
        let confirmation = self.inner.emitter.wait_for_chain(chain.id);
        let switched = future::try_join(
            requests.wallet_switch_ethereum_chain(chain.id),
            confirmation.map(Ok),
        )
        .await;

        let error = match switched {
            Ok(_) => return Ok(chain),
            Err(error) => error,
        };

        let unrecognized = matches!(
            &error,
            ConnectorError::Rpc(error) if error.is(RpcErrorCode::UnrecognizedChain)
        );
        if unrecognized {
            // a failure to add the chain is reported as a rejection, whatever
            // the wallet said
            return match self
                .add_chain(&requests, &chain, parameters.add_ethereum_chain_parameter.as_ref())
                .await
            {
                Ok(()) => Ok(chain),
                Err(error @ ConnectorError::UserRejectedRequest { .. }) => Err(error),
                Err(error) => Err(ConnectorError::user_rejected(error)),
            };
        }

        if error.is_user_rejection() {
            return Err(error.classify());
        }
        Err(ConnectorError::SwitchChain(Box::new(error)))
    }

    async fn add_chain(
        &self,
        requests: &Requests<'_, E::Provider>,
        chain: &Chain,
        overrides: Option<&AddEthereumChainOverrides>,
    ) -> Result<(), ConnectorError> {
        tracing::debug!(chain_id = chain.id, "chain unknown to the wallet, adding it");
        let parameter = AddEthereumChainParameter::new(chain, overrides);
        requests.wallet_add_ethereum_chain(&parameter).await?;

        let current = requests.eth_chain_id().await?;
        if current != chain.id {
            return Err(ConnectorError::user_rejected(
                "User rejected switch after adding network.",
            ));
        }
        Ok(())
    }

    pub async fn on_accounts_changed(&self, accounts: &[String]) -> Result<(), ConnectorError> {
        if accounts.is_empty() {
            self.on_disconnect(None).await;
            return Ok(());
        }

        // the application is waiting for this connector to connect again
        if self.inner.emitter.listener_count(ConnectorEventKind::Connect) > 0 {
            let chain_id = self.get_chain_id().await?;
            self.on_connect(&chain_id_to_hex(chain_id)).await?;
            if self.inner.parameters.shim_disconnect {
                self.shim().set_connected().await?;
            }
            return Ok(());
        }

        let mut checksummed = Vec::with_capacity(accounts.len());
        for account in accounts {
            let address = checksum_address(account).ok_or_else(|| {
                ConnectorError::invalid_response("accountsChanged", format!("Invalid address: {account}"))
            })?;
            checksummed.push(address);
        }
        self.inner.emitter.emit(ConnectorEvent::Change {
            accounts: Some(checksummed),
            chain_id: None,
        });
        Ok(())
    }

    pub fn on_chain_changed(&self, chain: &str) {
        match parse_chain_id_str(chain) {
            Some(chain_id) => self.inner.emitter.emit(ConnectorEvent::Change {
                accounts: None,
                chain_id: Some(chain_id),
            }),
            None => tracing::warn!(chain, "ignoring chainChanged with an invalid chain id"),
        }
    }

    pub async fn on_connect(&self, chain_id: &str) -> Result<(), ConnectorError> {
        let accounts = self.get_accounts().await?;
        if accounts.is_empty() {
            return Ok(());
        }
        let chain_id = parse_chain_id_str(chain_id)
            .ok_or_else(|| ConnectorError::invalid_response("connect", chain_id))?;

        self.inner
            .emitter
            .emit(ConnectorEvent::Connect { accounts, chain_id });

        if let Some(provider) = self.get_provider() {
            self.apply(&provider, StateEvent::Established);
        }
        if self.inner.parameters.shim_disconnect {
            self.shim().set_connected().await?;
        }
        Ok(())
    }

    /// The provider lost its connection. The disconnect flag is left alone,
    /// the provider knows better than the application here.
    pub async fn on_disconnect(&self, error: Option<&ProviderRpcError>) {
        let provider = self.get_provider();

        // MetaMask briefly disconnects with 1013 when its RPC hiccups
        if let Some(error) = error
            && error.code == RpcErrorCode::TryAgainLater
            && let Some(provider) = &provider
            && !Requests::new(provider)
                .eth_accounts()
                .await
                .unwrap_or_default()
                .is_empty()
        {
            tracing::debug!("ignoring transient disconnect");
            return;
        }

        self.inner.emitter.emit(ConnectorEvent::Disconnect);
        if let Some(provider) = provider {
            self.apply(&provider, StateEvent::Disconnected);
        }
    }
}
