//! Core aggregation logic: protocol types, stdio framing, upstream sessions,
//! the routing catalog, capability merge, configuration, and the controller
//! that ties them together.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod env;
pub mod error;
pub mod frame;
pub mod merge;
pub mod protocol;
pub mod session;

pub use config::{AggregatorConfig, ClientProfile, TransportConfig, TransportMode, UpstreamServer};
pub use controller::{AggregationController, ControllerStats};
pub use error::SessionError;
pub use protocol::{Capabilities, Envelope, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use session::UpstreamSession;
