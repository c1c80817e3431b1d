//! Core business logic abstractions

pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod money;
pub mod price;

// Re-export main types for cleaner imports
pub use currency::{Currency, DisplayCurrency, FxRates};
pub use error::Error;
pub use price::{Category, Lookup, PriceLookup};
