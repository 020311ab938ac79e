//! Gateway: fast-ack webhook ingress.
//!
//! One HTTP port. A webhook is verified, routed, and handed to the worker stage over a
//! channel; the platform gets its acknowledgment before any model work starts.

mod server;

pub use server::{run_gateway, GatewayState};
