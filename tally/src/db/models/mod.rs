//! Database record structures matching table schemas.
//!
//! - [`counters`]: counters, entity keys and counter mutations
//! - [`ledger`]: bills appended alongside counter changes
//! - [`products`]: product kinds and their stored codes

pub mod counters;
pub mod ledger;
pub mod products;
