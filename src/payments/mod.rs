pub mod credentials;
pub mod error;
pub mod factory;
pub mod fee;
pub mod provider;
pub mod providers;
pub mod strategy;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::AggregatorFactory;
pub use fee::FeeCalculator;
pub use provider::PaymentAggregator;
