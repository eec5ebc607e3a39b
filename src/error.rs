use crate::storage::StorageError;

/// Numeric codes a provider attaches to the errors it rejects requests with.
///
/// These are the EIP-1193 provider codes, the EIP-3085/3326 chain codes and
/// the few JSON-RPC codes wallets are known to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum RpcErrorCode {
    #[error("The user rejected the request.")]
    UserRejectedRequest,
    #[error("The requested method and/or account has not been authorized by the user.")]
    Unauthorized,
    #[error("The provider does not support the requested method.")]
    UnsupportedMethod,
    #[error("The provider is disconnected from all chains.")]
    Disconnected,
    #[error("The provider is not connected to the requested chain.")]
    ChainDisconnected,
    #[error("Unrecognized chain ID.")]
    UnrecognizedChain,
    /// MetaMask emits this when it briefly loses its connection to the network.
    #[error("Try again later.")]
    TryAgainLater,
    /// A request of the same kind is already pending in the wallet.
    #[error("Requested resource not available.")]
    ResourceUnavailable,
    #[error("An internal error was received.")]
    InternalError,
    #[error("Unknown error code `{0}'")]
    Unknown(i64),
}

impl From<i64> for RpcErrorCode {
    fn from(code: i64) -> Self {
        match code {
            4001 => RpcErrorCode::UserRejectedRequest,
            4100 => RpcErrorCode::Unauthorized,
            4200 => RpcErrorCode::UnsupportedMethod,
            4900 => RpcErrorCode::Disconnected,
            4901 => RpcErrorCode::ChainDisconnected,
            4902 => RpcErrorCode::UnrecognizedChain,
            1013 => RpcErrorCode::TryAgainLater,
            -32002 => RpcErrorCode::ResourceUnavailable,
            -32603 => RpcErrorCode::InternalError,
            unknown => RpcErrorCode::Unknown(unknown),
        }
    }
}

impl From<RpcErrorCode> for i64 {
    fn from(code: RpcErrorCode) -> Self {
        match code {
            RpcErrorCode::UserRejectedRequest => 4001,
            RpcErrorCode::Unauthorized => 4100,
            RpcErrorCode::UnsupportedMethod => 4200,
            RpcErrorCode::Disconnected => 4900,
            RpcErrorCode::ChainDisconnected => 4901,
            RpcErrorCode::UnrecognizedChain => 4902,
            RpcErrorCode::TryAgainLater => 1013,
            RpcErrorCode::ResourceUnavailable => -32002,
            RpcErrorCode::InternalError => -32603,
            RpcErrorCode::Unknown(code) => code,
        }
    }
}

/// Error value a provider rejects a `request` with.
#[derive(Debug, Clone, PartialEq, thiserror::Error, serde::Deserialize)]
#[error("{code} {message}")]
pub struct ProviderRpcError {
    pub code: RpcErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: RpcErrorCode::from(code),
            message: message.into(),
            data: None,
        }
    }

    /// code of the error some mobile wallets nest under `data.originalError`
    pub fn original_code(&self) -> Option<RpcErrorCode> {
        self.data
            .as_ref()?
            .get("originalError")?
            .get("code")
            .and_then(json_integer)
            .map(RpcErrorCode::from)
    }

    /// `true` if either the error or its nested original error carries `code`
    pub fn is(&self, code: RpcErrorCode) -> bool {
        self.code == code || self.original_code() == Some(code)
    }
}

/// read an integer out of a JSON number, including the integral doubles JS
/// numbers are decoded as
pub(crate) fn json_integer(value: &serde_json::Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectorError {
    #[error("Provider not found.")]
    ProviderNotFound,
    #[error("User rejected the request. {details}")]
    UserRejectedRequest { details: String },
    #[error("Requested resource not available. {0}")]
    ResourceUnavailable(#[source] ProviderRpcError),
    #[error("Chain not configured.")]
    ChainNotConfigured,
    #[error("An error occurred when attempting to switch chain. {0}")]
    SwitchChain(#[source] Box<ConnectorError>),
    #[error("Unexpected answer to `{method}': {info}")]
    InvalidResponse { method: &'static str, info: String },
    #[error(transparent)]
    Rpc(#[from] ProviderRpcError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ConnectorError {
    pub(crate) fn user_rejected(details: impl ToString) -> Self {
        Self::UserRejectedRequest {
            details: details.to_string(),
        }
    }

    pub(crate) fn invalid_response(method: &'static str, info: impl ToString) -> Self {
        Self::InvalidResponse {
            method,
            info: info.to_string(),
        }
    }

    /// the provider code this error was raised with, if any
    pub fn code(&self) -> Option<RpcErrorCode> {
        match self {
            Self::UserRejectedRequest { .. } => Some(RpcErrorCode::UserRejectedRequest),
            Self::ResourceUnavailable(_) => Some(RpcErrorCode::ResourceUnavailable),
            Self::Rpc(error) => Some(error.code),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(RpcErrorCode::UserRejectedRequest)
    }

    /// map the standard rejection and "already pending" codes to their
    /// dedicated variants, leaving anything else untouched
    pub(crate) fn classify(self) -> Self {
        match self {
            Self::Rpc(error) if error.code == RpcErrorCode::UserRejectedRequest => {
                Self::user_rejected(error.message)
            }
            Self::Rpc(error) if error.code == RpcErrorCode::ResourceUnavailable => {
                Self::ResourceUnavailable(error)
            }
            other => other,
        }
    }
}

impl<'de> serde::Deserialize<'de> for RpcErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {
            type Value = RpcErrorCode;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "Expecting an integer RpcErrorCode")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(RpcErrorCode::from(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                i64::try_from(v)
                    .map(RpcErrorCode::from)
                    .map_err(|_| E::custom(format!("error code `{v}' out of range")))
            }

            // JS numbers cross the FFI boundary as doubles
            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                    Ok(RpcErrorCode::from(v as i64))
                } else {
                    Err(E::custom(format!("error code `{v}' is not an integer")))
                }
            }
        }

        deserializer.deserialize_i64(Visitor)
    }
}
