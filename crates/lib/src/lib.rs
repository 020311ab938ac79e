//! Promptrelay core library — webhook signing, command routing, the fast-ack
//! gateway, and the async worker stage used by the CLI binary.

pub mod backends;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod routing;
pub mod secrets;
pub mod signing;
pub mod worker;
