#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! MCP tool surface for Navarch
//!
//! Every tool call flows provider → discovery gate → authorization gate →
//! handler → envelope. The envelope owns argument coercion, panic recovery,
//! error normalization, and observability; toolsets publish descriptors
//! conditionally on what the cluster's discovery reports.

mod context;
mod descriptor;
mod envelope;
pub mod error;
mod server;
mod toolset;
pub mod toolsets;
mod unstructured;

pub use context::{ForwardSession, ToolContext};
pub use descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
pub use envelope::{Envelope, McpMetrics};
pub use error::ToolError;
pub use server::NavarchServer;
pub use toolset::{ToolRegistry, ToolSpec, Toolset};
