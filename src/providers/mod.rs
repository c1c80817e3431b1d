pub mod pricing_endpoint;
pub mod util;

pub use pricing_endpoint::PricingEndpoint;
