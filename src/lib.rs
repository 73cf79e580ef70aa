//! Credit card rewards optimizer.
//!
//! Splits a planned purchase across a user's cards to maximize welcome-bonus
//! value plus rewards, minus annual fees.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod optimizer;
