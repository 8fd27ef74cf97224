//! Poultry farm record keeping: producers log daily flock records and income,
//! route them to a supervisor, and both sides review aggregated dashboards and
//! paginated reports over a loaded snapshot.

pub mod aggregate;
pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod format;
pub mod layout;
pub mod models;
pub mod photos;
pub mod report;
pub mod routing;
pub mod session;
pub mod store;
pub mod views;

pub use error::{FarmError, FarmResult};
