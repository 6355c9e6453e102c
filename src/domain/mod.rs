//! Domain layer: investment and session value objects, exchange-rate types,
//! and the ports through which the core talks to external collaborators.

pub mod investment;
pub mod ports;
pub mod rate;
pub mod session;
