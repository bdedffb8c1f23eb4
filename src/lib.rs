//! KPay payment orchestration backend.
//!
//! Routes payment legs to Midtrans, Espay, senangPay or the internal
//! K-Wallet, normalizes aggregator responses into one client shape and
//! reconciles status from webhooks and polling.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod payments;
pub mod services;
