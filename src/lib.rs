/*!

# Connector for injected EIP-1193 wallets

This library is meant to be used by web applications that talk to the
Ethereum wallets living in the browser, the ones that inject an
[EIP-1193](https://eips.ethereum.org/EIPS/eip-1193) provider object in the
page (`window.ethereum` and friends).

## Features

- Find the right provider when several wallets compete for `window.ethereum`
- Connect, reconnect and disconnect
- Follow the account and chain changes reported by the wallet
- Switch chain, adding it to the wallet first if needed

## Usage

Create an [`InjectedConnector`] for the wallet you are after. Without a
target it picks whatever provider sits in `window.ethereum`:

```no_run
use injected_connector::{
    Emitter, InjectedConnector, InjectedParameters, Storage,
    ffi::{LocalStorage, WindowEnvironment},
};
use std::rc::Rc;

let connector = InjectedConnector::new(
    InjectedParameters::default().target("metaMask"),
    WindowEnvironment::new(),
    Vec::new(),
    LocalStorage::new().map(|storage| Rc::new(storage) as Rc<dyn Storage>),
    Emitter::new(),
);
connector.setup();
```

EIP-1193 has no way to disconnect: once the user granted the application
access to their accounts, the wallet keeps exposing them. The connector
remembers a disconnect in the [`Storage`] it is given and won't consider
itself authorized until the next [`InjectedConnector::connect`].

```no_run
# use injected_connector::{ConnectParameters, Environment, InjectedConnector};
#
# async fn test<E: Environment + 'static>(connector: InjectedConnector<E>) -> anyhow::Result<()> {
if !connector.is_authorized().await {
    let connection = connector.connect(ConnectParameters::chain(1)).await?;
    println!("connected {:?} on chain {}", connection.accounts, connection.chain_id);
}
# Ok(()) }
```

What happens next (account or chain changes, the wallet disconnecting) is
reported on the [`Emitter`]:

```no_run
# use injected_connector::{ConnectorEvent, ConnectorEventKind, Emitter};
# let emitter = Emitter::new();
emitter.on(ConnectorEventKind::Change, |event| {
    if let ConnectorEvent::Change { chain_id: Some(chain_id), .. } = event {
        println!("now on chain {chain_id}");
    }
});
```

*/

pub mod chain;
mod connector;
pub mod emitter;
pub mod environment;
pub mod error;
pub mod ffi;
mod inject;
#[cfg(test)]
mod mock;
pub mod provider;
mod shim;
pub mod state;
mod storage;
pub mod target;

pub use self::{
    chain::{AddEthereumChainOverrides, Chain},
    connector::{
        ConnectParameters, ConnectionResult, ConnectorIdentity, InjectedConnector,
        InjectedParameters, SwitchChainParameters,
    },
    emitter::{ConnectorEvent, ConnectorEventKind, Emitter},
    environment::Environment,
    error::{ConnectorError, ProviderRpcError, RpcErrorCode},
    inject::{AsyncInject, DEFAULT_INJECTION_TIMEOUT},
    provider::Eip1193Provider,
    shim::DisconnectShim,
    state::ConnectionState,
    storage::{MemoryStorage, Storage, StorageError},
    target::{Target, TargetDescriptor},
};
