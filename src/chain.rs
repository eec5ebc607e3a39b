use crate::provider::chain_id_to_hex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcUrls {
    pub http: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_socket: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct BlockExplorer {
    pub name: String,
    pub url: String,
}

/// A `default` entry and any number of named alternatives.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Named<T> {
    pub default: T,
    #[serde(flatten)]
    pub others: BTreeMap<String, T>,
}

impl<T> Named<T> {
    pub fn new(default: T) -> Self {
        Self {
            default,
            others: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: T) -> Self {
        self.others.insert(name.into(), value);
        self
    }

    /// the default entry followed by the others, in name order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.default).chain(self.others.values())
    }
}

/// A chain the application is configured for.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: u64,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Named<RpcUrls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_explorers: Option<Named<BlockExplorer>>,
}

/// Caller supplied replacements for the values [`AddEthereumChainParameter`]
/// would otherwise take from the [`Chain`].
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEthereumChainOverrides {
    pub chain_name: Option<String>,
    pub native_currency: Option<NativeCurrency>,
    pub rpc_urls: Option<Vec<String>>,
    pub block_explorer_urls: Option<Vec<String>>,
    pub icon_urls: Option<Vec<String>>,
}

/// Parameter of `wallet_addEthereumChain` (EIP-3085).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEthereumChainParameter {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_explorer_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_urls: Option<Vec<String>>,
}

impl AddEthereumChainParameter {
    /// Describe `chain` to a wallet that does not know it.
    ///
    /// Only the first default RPC URL is submitted, the default block
    /// explorer comes first in the explorer list.
    pub fn new(chain: &Chain, overrides: Option<&AddEthereumChainOverrides>) -> Self {
        let overrides = overrides.cloned().unwrap_or_default();

        let block_explorer_urls = overrides.block_explorer_urls.or_else(|| {
            chain.block_explorers.as_ref().map(|explorers| {
                explorers
                    .iter()
                    .map(|explorer| explorer.url.clone())
                    .collect()
            })
        });

        let rpc_urls = overrides
            .rpc_urls
            .filter(|urls| !urls.is_empty())
            .unwrap_or_else(|| {
                vec![
                    chain
                        .rpc_urls
                        .default
                        .http
                        .first()
                        .cloned()
                        .unwrap_or_default(),
                ]
            });

        Self {
            chain_id: chain_id_to_hex(chain.id),
            chain_name: overrides.chain_name.unwrap_or_else(|| chain.name.clone()),
            native_currency: overrides
                .native_currency
                .unwrap_or_else(|| chain.native_currency.clone()),
            rpc_urls,
            block_explorer_urls,
            icon_urls: overrides.icon_urls,
        }
    }
}
