//! Relay Common Types and Wire Protocol
//!
//! This crate provides the shared protocol surface for the relay RPC runtime:
//!
//! - **Protocol Layer**: [`protocol::Request`] / [`protocol::Response`]
//!   envelope types, the error taxonomy, and method-signature strings
//! - **Call Context**: [`context::RpcContext`], explicit per-call metadata
//!   propagated out-of-band with a request
//! - **Wire Layer**: [`wire::Frame`] and its binary encoding
//!   (`magic | version | type | sequence id | length | payload`)
//! - **Configuration**: serde-deserializable settings consumed by the
//!   client and server composition roots
//!
//! # Overview
//!
//! A call is carried as a [`protocol::Request`] naming a service, a method
//! and a method signature that disambiguates overloads, with arguments as
//! opaque JSON values. The matching [`protocol::Response`] carries either a
//! success payload or an error message of the form `"<ERROR_CODE>: <message>"`.
//!
//! Over the binary transport the JSON-encoded envelope rides inside a
//! [`wire::Frame`] with a multiplexing sequence id; over the text transport
//! it is POSTed directly as an HTTP body.

pub mod config;
pub mod context;
pub mod protocol;
pub mod wire;

pub use context::RpcContext;
pub use protocol::{ErrorCode, Request, Response, Result, RpcError};
