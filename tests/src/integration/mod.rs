//! Cross-component integration flows.

pub mod connection_lifecycle;
pub mod dispatch_flows;
pub mod sequential_streams;
