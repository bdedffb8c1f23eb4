use crate::payments::credentials::{AggregatorConfiguration, SecretDecryptor};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentAggregator;
use crate::payments::providers::{EspayClient, MidtransClient, SenangpayClient};
use crate::payments::types::AggregatorName;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AggregatorFactoryConfig {
    pub enabled_aggregators: Vec<AggregatorName>,
}

impl AggregatorFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let enabled_raw = std::env::var("ENABLED_AGGREGATORS")
            .unwrap_or_else(|_| "midtrans,espay,senangpay".to_string());
        let mut enabled_aggregators = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            let name = AggregatorName::from_str(value)?;
            if !enabled_aggregators.contains(&name) {
                enabled_aggregators.push(name);
            }
        }
        Ok(Self {
            enabled_aggregators,
        })
    }
}

/// Aggregator clients built once at startup and shared read-only.
#[derive(Clone, Default)]
pub struct AggregatorFactory {
    aggregators: HashMap<AggregatorName, Arc<dyn PaymentAggregator>>,
}

impl AggregatorFactory {
    pub fn from_env() -> PaymentResult<Self> {
        Self::with_config(&AggregatorFactoryConfig::from_env()?)
    }

    pub fn with_config(config: &AggregatorFactoryConfig) -> PaymentResult<Self> {
        let mut aggregators: Vec<Arc<dyn PaymentAggregator>> = Vec::new();
        for name in &config.enabled_aggregators {
            let client: Arc<dyn PaymentAggregator> = match name {
                AggregatorName::Midtrans => Arc::new(MidtransClient::from_env()?),
                AggregatorName::Espay => Arc::new(EspayClient::from_env()?),
                AggregatorName::Senangpay => Arc::new(SenangpayClient::from_env()?),
            };
            aggregators.push(client);
        }
        Ok(Self::with_aggregators(aggregators))
    }

    /// Build from stored configurations; each key is decrypted once here.
    pub fn from_configurations(
        configurations: &[AggregatorConfiguration],
        decryptor: &dyn SecretDecryptor,
    ) -> PaymentResult<Self> {
        let mut aggregators: Vec<Arc<dyn PaymentAggregator>> = Vec::new();
        for configuration in configurations {
            let client: Arc<dyn PaymentAggregator> = match configuration.aggregator {
                AggregatorName::Midtrans => {
                    Arc::new(MidtransClient::from_configuration(configuration, decryptor)?)
                }
                AggregatorName::Espay => {
                    Arc::new(EspayClient::from_configuration(configuration, decryptor)?)
                }
                AggregatorName::Senangpay => {
                    Arc::new(SenangpayClient::from_configuration(configuration, decryptor)?)
                }
            };
            aggregators.push(client);
        }
        Ok(Self::with_aggregators(aggregators))
    }

    pub fn with_aggregators(aggregators: Vec<Arc<dyn PaymentAggregator>>) -> Self {
        let aggregators: HashMap<_, _> = aggregators
            .into_iter()
            .map(|aggregator| (aggregator.name(), aggregator))
            .collect();
        info!(count = aggregators.len(), "payment aggregators ready");
        Self { aggregators }
    }

    pub fn get(&self, name: AggregatorName) -> PaymentResult<Arc<dyn PaymentAggregator>> {
        self.aggregators.get(&name).cloned().ok_or_else(|| {
            PaymentError::configuration(format!("aggregator {} is not enabled", name))
        })
    }

    pub fn list_available(&self) -> Vec<AggregatorName> {
        let mut names: Vec<AggregatorName> = self.aggregators.keys().copied().collect();
        names.sort_by_key(|name| name.as_str());
        names
    }
}
