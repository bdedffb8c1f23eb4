//! Channel strategies and the per-aggregator dispatch table.
//!
//! Every aggregator wires a fixed set of strategies keyed by
//! `(PaymentMethod, ChannelCode)`. Lookups are exact: a channel an aggregator
//! was not wired for is a routing error, never a fallback.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{
    AggregatorName, Channel, ChannelCode, Payment, PaymentMethod, PaymentRequest, PaymentResponse,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyKey {
    pub method: PaymentMethod,
    pub channel: ChannelCode,
}

impl StrategyKey {
    pub const fn new(method: PaymentMethod, channel: ChannelCode) -> Self {
        Self { method, channel }
    }
}

impl std::fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.method, self.channel)
    }
}

#[async_trait]
pub trait ChannelStrategy: Send + Sync {
    /// Transport of the aggregator this strategy belongs to.
    type Api: Send + Sync;

    /// Build the provider charge payload and submit it. Returns the decoded
    /// provider body untouched so it can be stored as the gateway response.
    async fn pay(&self, api: &Self::Api, request: &PaymentRequest) -> PaymentResult<JsonValue>;

    /// Normalize the stored gateway response into the client-facing shape.
    /// A rejected charge comes back as `PaymentRequired` with
    /// `deactivate_channel` set; the caller owns the channel update.
    fn client_response(&self, channel: &Channel, payment: &Payment)
        -> PaymentResult<PaymentResponse>;
}

pub type SharedStrategy<A> = Arc<dyn ChannelStrategy<Api = A>>;

pub struct StrategyRegistry<A> {
    aggregator: AggregatorName,
    strategies: HashMap<StrategyKey, SharedStrategy<A>>,
}

impl<A: Send + Sync + 'static> StrategyRegistry<A> {
    pub fn builder(aggregator: AggregatorName) -> StrategyRegistryBuilder<A> {
        StrategyRegistryBuilder {
            aggregator,
            strategies: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn get(
        &self,
        method: PaymentMethod,
        channel: ChannelCode,
    ) -> PaymentResult<SharedStrategy<A>> {
        self.strategies
            .get(&StrategyKey::new(method, channel))
            .cloned()
            .ok_or_else(|| PaymentError::StrategyNotFound {
                aggregator: self.aggregator.to_string(),
                method: method.to_string(),
                channel: channel.to_string(),
            })
    }

    pub fn supports(&self, method: PaymentMethod, channel: ChannelCode) -> bool {
        self.strategies
            .contains_key(&StrategyKey::new(method, channel))
    }

    pub fn keys(&self) -> Vec<StrategyKey> {
        self.strategies.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

pub struct StrategyRegistryBuilder<A> {
    aggregator: AggregatorName,
    strategies: HashMap<StrategyKey, SharedStrategy<A>>,
    duplicates: Vec<StrategyKey>,
}

impl<A: Send + Sync + 'static> StrategyRegistryBuilder<A> {
    pub fn register(
        mut self,
        method: PaymentMethod,
        channel: ChannelCode,
        strategy: SharedStrategy<A>,
    ) -> Self {
        let key = StrategyKey::new(method, channel);
        if self.strategies.insert(key, strategy).is_some() {
            self.duplicates.push(key);
        }
        self
    }

    /// Fails when a key was registered twice or a required key is missing.
    pub fn build(self, required: &[StrategyKey]) -> PaymentResult<StrategyRegistry<A>> {
        if let Some(key) = self.duplicates.first() {
            return Err(PaymentError::configuration(format!(
                "{} registers {} more than once",
                self.aggregator, key
            )));
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|key| !self.strategies.contains_key(key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PaymentError::configuration(format!(
                "{} is missing strategies for: {}",
                self.aggregator,
                missing.join(", ")
            )));
        }

        Ok(StrategyRegistry {
            aggregator: self.aggregator,
            strategies: self.strategies,
        })
    }
}

/// First token is the first name; the remaining tokens, joined by single
/// spaces, are the last name.
pub fn split_customer_name(full_name: &str) -> (String, String) {
    let mut tokens = full_name.split_whitespace();
    let first = tokens.next().unwrap_or_default().to_string();
    let last = tokens.collect::<Vec<_>>().join(" ");
    (first, last)
}

pub fn decode_gateway_response<T: DeserializeOwned>(payment: &Payment) -> PaymentResult<T> {
    let raw = payment.gateway_response()?;
    serde_json::from_value(raw.clone()).map_err(|e| {
        PaymentError::internal(format!(
            "gateway response for {} does not match provider shape: {}",
            payment.order_id, e
        ))
    })
}
