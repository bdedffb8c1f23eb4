pub mod espay;
pub mod midtrans;
pub mod senangpay;

pub use espay::{EspayClient, EspayConfig};
pub use midtrans::{MidtransClient, MidtransConfig};
pub use senangpay::{SenangpayClient, SenangpayConfig};
