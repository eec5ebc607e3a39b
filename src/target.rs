//! Locating the provider a connector talks to.
//!
//! Several wallets may inject into the same page. They either share the
//! ambient slot (`window.ethereum.providers` listing all of them) or the last
//! one to load wins it, and some of them advertise other wallets' capability
//! flags for compatibility. A [`TargetDescriptor`] says how to recognise the
//! wallet we are after.

use crate::{
    environment::{AMBIENT_PROVIDER, Environment},
    provider::{Eip1193Provider, ProviderFlags},
};
use std::{borrow::Cow, fmt, rc::Rc};

/// Wallets known to set `isMetaMask` next to their own flag.
pub const METAMASK_IMPERSONATORS: &[&str] = &[
    "isApexWallet",
    "isAvalanche",
    "isBitKeep",
    "isBlockWallet",
    "isKuCoinWallet",
    "isMathWallet",
    "isOkxWallet",
    "isOKExWallet",
    "isOneInchIOSWallet",
    "isOneInchAndroidWallet",
    "isOpera",
    "isPhantom",
    "isPortal",
    "isRabby",
    "isTokenPocket",
    "isTokenary",
    "isUniswapWallet",
    "isZerion",
];

/// How to pick a provider out of the environment.
#[derive(Clone)]
pub enum Selector {
    /// whatever sits in the ambient slot
    Ambient,
    /// the first provider declaring the given capability flag
    Flag(Cow<'static, str>),
    /// the first provider that is really MetaMask, see [`is_metamask`]
    MetaMask,
    /// the first provider the predicate accepts
    Predicate(Rc<dyn Fn(&dyn ProviderFlags) -> bool>),
    /// a wallet specific global, falling back to another selector when the
    /// global is missing
    Namespace {
        path: &'static [&'static str],
        fallback: Box<Selector>,
    },
}

impl Selector {
    pub fn resolve<E: Environment>(&self, environment: &E) -> Option<E::Provider> {
        match self {
            Selector::Ambient => environment.provider_at(AMBIENT_PROVIDER),
            Selector::Flag(flag) => find_provider(environment, |provider| provider.flag(flag)),
            Selector::MetaMask => find_provider(environment, |provider| is_metamask(provider)),
            Selector::Predicate(predicate) => find_provider(environment, |provider| {
                predicate(provider as &dyn ProviderFlags)
            }),
            Selector::Namespace { path, fallback } => environment
                .provider_at(path)
                .or_else(|| fallback.resolve(environment)),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Ambient => f.write_str("Ambient"),
            Selector::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Selector::MetaMask => f.write_str("MetaMask"),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
            Selector::Namespace { path, fallback } => f
                .debug_struct("Namespace")
                .field("path", path)
                .field("fallback", fallback)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    pub id: Cow<'static, str>,
    pub name: Cow<'static, str>,
    pub selector: Selector,
    /// the wallet honours `wallet_requestPermissions` to let the user pick
    /// other accounts on reconnection
    pub supports_account_selection: bool,
}

impl TargetDescriptor {
    /// the default target: whatever provider sits in `window.ethereum`
    pub fn injected() -> Self {
        Self {
            id: Cow::Borrowed("injected"),
            name: Cow::Borrowed("Injected"),
            selector: Selector::Ambient,
            supports_account_selection: true,
        }
    }

    pub fn metamask() -> Self {
        Self {
            id: Cow::Borrowed("metaMask"),
            name: Cow::Borrowed("MetaMask"),
            selector: Selector::MetaMask,
            supports_account_selection: true,
        }
    }

    pub fn coinbase_wallet() -> Self {
        Self {
            id: Cow::Borrowed("coinbaseWallet"),
            name: Cow::Borrowed("Coinbase Wallet"),
            selector: Selector::Namespace {
                path: &["coinbaseWalletExtension"],
                fallback: Box::new(Selector::Flag(Cow::Borrowed("isCoinbaseWallet"))),
            },
            supports_account_selection: false,
        }
    }

    pub fn phantom() -> Self {
        Self {
            id: Cow::Borrowed("phantom"),
            name: Cow::Borrowed("Phantom"),
            selector: Selector::Namespace {
                path: &["phantom", "ethereum"],
                fallback: Box::new(Selector::Flag(Cow::Borrowed("isPhantom"))),
            },
            supports_account_selection: false,
        }
    }

    /// the descriptor of a well known wallet identifier
    pub fn well_known(id: &str) -> Option<Self> {
        match id {
            "metaMask" => Some(Self::metamask()),
            "coinbaseWallet" => Some(Self::coinbase_wallet()),
            "phantom" => Some(Self::phantom()),
            _ => None,
        }
    }

    /// the descriptor for `id`, synthesised from the `is<Id>` capability
    /// flag when the wallet is not a well known one
    pub fn from_id(id: &str) -> Self {
        if let Some(descriptor) = Self::well_known(id) {
            return descriptor;
        }

        let name = capitalize(id);
        Self {
            id: Cow::Owned(id.to_owned()),
            selector: Selector::Flag(Cow::Owned(format!("is{name}"))),
            name: Cow::Owned(name),
            supports_account_selection: true,
        }
    }

    pub fn resolve<E: Environment>(&self, environment: &E) -> Option<E::Provider> {
        self.selector.resolve(environment)
    }
}

/// What the connector was asked to connect to.
#[derive(Clone)]
pub enum Target {
    /// a wallet identifier, e.g. `"metaMask"` or `"rainbow"`
    Id(String),
    Descriptor(TargetDescriptor),
    /// computes the descriptor on demand, `None` falls back to the default
    /// injected target
    Resolver(Rc<dyn Fn() -> Option<TargetDescriptor>>),
}

impl Target {
    pub fn resolver(resolver: impl Fn() -> Option<TargetDescriptor> + 'static) -> Self {
        Target::Resolver(Rc::new(resolver))
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Target::Id(id.to_owned())
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Target::Id(id)
    }
}

impl From<TargetDescriptor> for Target {
    fn from(descriptor: TargetDescriptor) -> Self {
        Target::Descriptor(descriptor)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Target::Descriptor(descriptor) => f.debug_tuple("Descriptor").field(descriptor).finish(),
            Target::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// the descriptor an optional [`Target`] stands for
pub fn descriptor(target: Option<&Target>) -> TargetDescriptor {
    match target {
        Some(Target::Id(id)) => TargetDescriptor::from_id(id),
        Some(Target::Descriptor(descriptor)) => descriptor.clone(),
        Some(Target::Resolver(resolver)) => resolver().unwrap_or_else(TargetDescriptor::injected),
        None => TargetDescriptor::injected(),
    }
}

/// Find the provider `target` designates. A missing environment (no
/// browser) is not an error, there is simply no provider.
pub fn locate<E: Environment>(
    environment: Option<&E>,
    target: Option<&Target>,
) -> Option<E::Provider> {
    let environment = environment?;
    descriptor(target).resolve(environment)
}

/// scan the co-injected providers, or test the ambient one when it is alone
pub fn find_provider<E, F>(environment: &E, predicate: F) -> Option<E::Provider>
where
    E: Environment,
    F: Fn(&E::Provider) -> bool,
{
    let ambient = environment.provider_at(AMBIENT_PROVIDER)?;
    match ambient.providers() {
        Some(providers) => providers.into_iter().find(|provider| predicate(provider)),
        None => predicate(&ambient).then_some(ambient),
    }
}

/// `true` for the genuine MetaMask extension.
///
/// Brave's built-in wallet sets `isMetaMask` too but lacks MetaMask's
/// internal `_events`/`_state` fields.
pub fn is_metamask<P: ProviderFlags + ?Sized>(provider: &P) -> bool {
    if !provider.flag("isMetaMask") {
        return false;
    }
    if provider.flag("isBraveWallet")
        && !provider.has_property("_events")
        && !provider.has_property("_state")
    {
        return false;
    }
    !METAMASK_IMPERSONATORS
        .iter()
        .any(|flag| provider.flag(flag))
}

fn capitalize(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
