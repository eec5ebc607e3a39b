//! Waiting for wallets that inject their provider after the page loaded.

use crate::{environment::Environment, target::TargetDescriptor};
use futures::future::{Either, select};
use std::time::Duration;

pub const DEFAULT_INJECTION_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Whether (and for how long) to wait for a late provider injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AsyncInject {
    #[default]
    Disabled,
    Enabled(Duration),
}

impl AsyncInject {
    pub fn timeout(self) -> Option<Duration> {
        match self {
            AsyncInject::Disabled => None,
            AsyncInject::Enabled(timeout) => Some(timeout),
        }
    }
}

/// Wait for either the environment's injection announcement or `timeout`,
/// whichever comes first, then look for the provider again.
///
/// The losing side is dropped before returning, which unregisters the
/// announcement listener or cancels the timer.
pub async fn detect<E: Environment>(
    environment: &E,
    descriptor: &TargetDescriptor,
    timeout: Duration,
) -> Option<E::Provider> {
    let announced = environment.injection_signal();
    let timer = environment.sleep(timeout);

    match select(announced, timer).await {
        Either::Left(((), timer)) => {
            tracing::debug!("provider injection announced");
            drop(timer);
        }
        Either::Right(((), announced)) => {
            tracing::debug!(?timeout, "timed out waiting for provider injection");
            drop(announced);
        }
    }

    descriptor.resolve(environment)
}

impl<'de> serde::Deserialize<'de> for AsyncInject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {
            type Value = AsyncInject;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "Expecting a boolean or a timeout in milliseconds")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v {
                    Ok(AsyncInject::Enabled(DEFAULT_INJECTION_TIMEOUT))
                } else {
                    Ok(AsyncInject::Disabled)
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(AsyncInject::Enabled(Duration::from_millis(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| AsyncInject::Enabled(Duration::from_millis(v)))
                    .map_err(|_| E::custom(format!("negative timeout `{v}'")))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.is_finite() && v >= 0.0 {
                    Ok(AsyncInject::Enabled(Duration::from_secs_f64(v / 1_000.0)))
                } else {
                    Err(E::custom(format!("invalid timeout `{v}'")))
                }
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(AsyncInject::Disabled)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(AsyncInject::Disabled)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
