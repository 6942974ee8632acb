//! Relay connection handling.
//!
//! One module per concern: [`handler`] owns the connection lifecycle,
//! [`messages`] the wire types.

pub mod handler;
pub mod messages;

pub use handler::relay_handler;
pub use messages::{
    CallDescriptor, CallDetailsEvent, ConnectionSettings, FrameRoute, GenerationTrigger,
    InboundEvent, OutboundFrame,
};
