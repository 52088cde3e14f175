//! Provider-side runtime for relay RPC.
//!
//! A provider registers service skeletons with a [`dispatcher::Dispatcher`],
//! exposes them over one or both server surfaces ([`frame_server::FrameServer`]
//! for the binary protocol, [`http_server::HttpServer`] for JSON over HTTP),
//! and announces itself through a `relay_registry::Registry`.
//! [`provider::ProviderBootstrap`] ties the three together.

pub mod dispatcher;
pub mod frame_server;
pub mod http_server;
pub mod provider;

pub use dispatcher::{Dispatcher, ServiceDef};
pub use frame_server::FrameServer;
pub use http_server::HttpServer;
pub use provider::ProviderBootstrap;
