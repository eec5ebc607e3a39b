use crate::error::{ConnectorError, ProviderRpcError, json_integer};
use alloy_primitives::Address;
use futures::future::LocalBoxFuture;
use serde_json::{Value, json};
use std::{
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

/// Arguments of an EIP-1193 `request` call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RequestArguments {
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            params: None,
        }
    }

    pub fn with_params(method: &'static str, params: Value) -> Self {
        Self {
            method,
            params: Some(params),
        }
    }
}

/// The events a provider emits to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    AccountsChanged,
    ChainChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::AccountsChanged,
        EventKind::ChainChanged,
    ];

    /// the event name as the provider knows it
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::AccountsChanged => "accountsChanged",
            EventKind::ChainChanged => "chainChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// the provider can serve requests to `chain_id` (hex encoded)
    Connect { chain_id: String },
    Disconnect(Option<ProviderRpcError>),
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

impl ProviderEvent {
    /// Decode the payload a provider passed to a `kind` listener.
    ///
    /// A `disconnect` whose error cannot be decoded is still a disconnect,
    /// only the error detail is lost.
    pub fn decode(kind: EventKind, payload: Value) -> Result<Self, serde_json::Error> {
        // a few wallets report the chain id as a number
        fn chain_id(value: Value) -> String {
            match value {
                Value::String(chain_id) => chain_id,
                other => other.to_string(),
            }
        }

        match kind {
            EventKind::Connect => {
                #[derive(serde::Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct ConnectInfo {
                    chain_id: Value,
                }

                let info: ConnectInfo = serde_json::from_value(payload)?;
                Ok(ProviderEvent::Connect {
                    chain_id: chain_id(info.chain_id),
                })
            }
            EventKind::Disconnect => {
                let error = serde_json::from_value(payload).unwrap_or_else(|error| {
                    tracing::debug!(%error, "undecodable disconnect error");
                    None
                });
                Ok(ProviderEvent::Disconnect(error))
            }
            EventKind::AccountsChanged => {
                serde_json::from_value(payload).map(ProviderEvent::AccountsChanged)
            }
            EventKind::ChainChanged => Ok(ProviderEvent::ChainChanged(chain_id(payload))),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ProviderEvent::Connect { .. } => EventKind::Connect,
            ProviderEvent::Disconnect(_) => EventKind::Disconnect,
            ProviderEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => EventKind::ChainChanged,
        }
    }
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(0);

/// A callback registered for one [`EventKind`].
///
/// Providers remove listeners by identity, two clones of the same
/// `Listener` are the same listener.
#[derive(Clone)]
pub struct Listener {
    id: u64,
    kind: EventKind,
    callback: Rc<dyn Fn(ProviderEvent)>,
}

impl Listener {
    pub fn new(kind: EventKind, callback: impl Fn(ProviderEvent) + 'static) -> Self {
        Self {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            callback: Rc::new(callback),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn call(&self, event: ProviderEvent) {
        (self.callback)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Read access to the capability flags a wallet advertises its identity with
/// (`isMetaMask`, `isCoinbaseWallet`...).
pub trait ProviderFlags {
    /// `true` if the boolean property `name` is set and truthy
    fn flag(&self, name: &str) -> bool;

    /// `true` if the property `name` is present at all, whatever its value
    fn has_property(&self, name: &str) -> bool;
}

/// An injected EIP-1193 provider.
pub trait Eip1193Provider: ProviderFlags + Clone + 'static {
    fn request(&self, args: RequestArguments) -> LocalBoxFuture<'static, Result<Value, ProviderRpcError>>;

    fn on(&self, listener: &Listener);

    fn remove_listener(&self, listener: &Listener);

    /// the co-injected providers when several wallets share the ambient slot
    fn providers(&self) -> Option<Vec<Self>>;
}

/// The typed subset of the provider protocol the connector relies on.
pub(crate) struct Requests<'a, P> {
    provider: &'a P,
}

impl<'a, P: Eip1193Provider> Requests<'a, P> {
    pub(crate) fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    async fn call(&self, args: RequestArguments) -> Result<Value, ConnectorError> {
        let method = args.method;
        tracing::trace!(method, "provider request");
        self.provider.request(args).await.map_err(|error| {
            tracing::debug!(method, %error, "provider request failed");
            ConnectorError::Rpc(error)
        })
    }

    pub(crate) async fn eth_accounts(&self) -> Result<Vec<Address>, ConnectorError> {
        let accounts = self.call(RequestArguments::new("eth_accounts")).await?;
        parse_addresses("eth_accounts", &accounts)
    }

    pub(crate) async fn eth_request_accounts(&self) -> Result<Vec<Address>, ConnectorError> {
        let accounts = self
            .call(RequestArguments::new("eth_requestAccounts"))
            .await?;
        parse_addresses("eth_requestAccounts", &accounts)
    }

    pub(crate) async fn eth_chain_id(&self) -> Result<u64, ConnectorError> {
        let chain_id = self.call(RequestArguments::new("eth_chainId")).await?;
        parse_chain_id(&chain_id)
            .ok_or_else(|| ConnectorError::invalid_response("eth_chainId", &chain_id))
    }

    /// asks for the `eth_accounts` permission again, which makes the wallet
    /// show its account selection, and returns the accounts it was granted for
    pub(crate) async fn wallet_request_permissions(
        &self,
    ) -> Result<Vec<Address>, ConnectorError> {
        let permissions = self
            .call(RequestArguments::with_params(
                "wallet_requestPermissions",
                json!([{ "eth_accounts": {} }]),
            ))
            .await?;

        let accounts = permissions
            .get(0)
            .and_then(|permission| permission.get("caveats"))
            .and_then(|caveats| caveats.get(0))
            .and_then(|caveat| caveat.get("value"));
        match accounts {
            Some(accounts) => parse_addresses("wallet_requestPermissions", accounts),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) async fn wallet_switch_ethereum_chain(
        &self,
        chain_id: u64,
    ) -> Result<(), ConnectorError> {
        self.call(RequestArguments::with_params(
            "wallet_switchEthereumChain",
            json!([{ "chainId": chain_id_to_hex(chain_id) }]),
        ))
        .await
        .map(|_| ())
    }

    pub(crate) async fn wallet_add_ethereum_chain(
        &self,
        parameter: &crate::chain::AddEthereumChainParameter,
    ) -> Result<(), ConnectorError> {
        let parameter = serde_json::to_value(parameter)
            .map_err(|error| ConnectorError::invalid_response("wallet_addEthereumChain", error))?;
        self.call(RequestArguments::with_params(
            "wallet_addEthereumChain",
            Value::Array(vec![parameter]),
        ))
        .await
        .map(|_| ())
    }
}

/// canonicalise a raw address, the result displays checksummed
pub fn checksum_address(raw: &str) -> Option<Address> {
    raw.parse::<Address>().ok()
}

pub(crate) fn parse_addresses(
    method: &'static str,
    value: &Value,
) -> Result<Vec<Address>, ConnectorError> {
    let Some(array) = value.as_array() else {
        return Err(ConnectorError::invalid_response(
            method,
            format!("expected a list of addresses, got {value}"),
        ));
    };

    let mut addresses = Vec::with_capacity(array.len());
    for address in array {
        let Some(address) = address.as_str() else {
            return Err(ConnectorError::invalid_response(
                method,
                format!("Invalid address: {address}"),
            ));
        };
        let address = checksum_address(address).ok_or_else(|| {
            ConnectorError::invalid_response(method, format!("Invalid address: {address}"))
        })?;
        addresses.push(address);
    }
    Ok(addresses)
}

/// normalise a chain id given as a hex string, a decimal string or a number
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::String(chain_id) => parse_chain_id_str(chain_id),
        Value::Number(_) => json_integer(value).and_then(|id| u64::try_from(id).ok()),
        _ => None,
    }
}

pub fn parse_chain_id_str(chain_id: &str) -> Option<u64> {
    match chain_id
        .strip_prefix("0x")
        .or_else(|| chain_id.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => chain_id.parse().ok(),
    }
}

pub fn chain_id_to_hex(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn decode_events() {
        assert_eq!(
            ProviderEvent::decode(EventKind::Connect, json!({ "chainId": "0x89" })).unwrap(),
            ProviderEvent::Connect {
                chain_id: "0x89".to_owned()
            }
        );
        assert_eq!(
            ProviderEvent::decode(EventKind::ChainChanged, json!(137)).unwrap(),
            ProviderEvent::ChainChanged("137".to_owned())
        );
        assert_eq!(
            ProviderEvent::decode(EventKind::AccountsChanged, json!([])).unwrap(),
            ProviderEvent::AccountsChanged(Vec::new())
        );
        assert!(ProviderEvent::decode(EventKind::AccountsChanged, json!("0x1")).is_err());
    }

    #[test]
    fn disconnect_always_decodes() {
        assert_eq!(
            ProviderEvent::decode(
                EventKind::Disconnect,
                json!({ "code": 4900, "message": "Disconnected" })
            )
            .unwrap(),
            ProviderEvent::Disconnect(Some(ProviderRpcError::new(4900, "Disconnected")))
        );
        assert_eq!(
            ProviderEvent::decode(EventKind::Disconnect, Value::Null).unwrap(),
            ProviderEvent::Disconnect(None)
        );
        assert_eq!(
            ProviderEvent::decode(EventKind::Disconnect, json!({ "code": "oops" })).unwrap(),
            ProviderEvent::Disconnect(None)
        );
        assert_eq!(
            ProviderEvent::decode(EventKind::Disconnect, json!({ "message": "gone" })).unwrap(),
            ProviderEvent::Disconnect(None)
        );
    }

    #[test]
    fn chain_id_forms() {
        assert_eq!(parse_chain_id(&json!("0x1")), Some(1));
        assert_eq!(parse_chain_id(&json!("0x89")), Some(137));
        assert_eq!(parse_chain_id(&json!("10")), Some(10));
        assert_eq!(parse_chain_id(&json!(8453)), Some(8453));
        assert_eq!(parse_chain_id(&json!(8453.0)), Some(8453));
        assert_eq!(parse_chain_id(&json!("0xzz")), None);
        assert_eq!(parse_chain_id(&json!(null)), None);
        assert_eq!(chain_id_to_hex(137), "0x89");
    }

    #[test]
    fn addresses_are_checksummed() {
        let addresses = parse_addresses(
            "eth_accounts",
            &json!(["0xd8da6bf26964af9d7eed9e03e53415d37aa96045"]),
        )
        .unwrap();

        assert_eq!(
            addresses[0].to_string(),
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
        );
    }

    #[test]
    fn invalid_addresses() {
        assert!(matches!(
            parse_addresses("eth_accounts", &json!(["0x1234"])),
            Err(ConnectorError::InvalidResponse {
                method: "eth_accounts",
                ..
            })
        ));
        assert!(parse_addresses("eth_accounts", &json!({})).is_err());
    }

    #[test]
    fn listener_identity() {
        let fired = Rc::new(Cell::new(false));
        let raised = fired.clone();
        let listener = Listener::new(EventKind::ChainChanged, move |_| raised.set(true));
        let other = Listener::new(EventKind::ChainChanged, |_| {});

        assert_eq!(listener, listener.clone());
        assert_ne!(listener, other);

        listener.call(ProviderEvent::ChainChanged("0x1".to_owned()));
        assert!(fired.get());
    }
}
