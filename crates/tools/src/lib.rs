//! Capabilities a specialist can invoke while working a consultation.
//!
//! Each specialist gets a [`ToolGateway`] built from the static specialty
//! mapping in [`capability`]. The gateway resolves a requested capability
//! by name and always answers with a text observation: failures come back
//! as `Error ...` strings so the reasoning loop can keep going.

pub mod calculators;
pub mod capability;
pub mod criteria;
pub mod gateway;
pub mod knowledge;
pub mod literature;

pub use capability::{Capability, capabilities_for};
pub use gateway::{ToolCall, ToolGateway, ToolServices, ToolsConfig};
pub use knowledge::KnowledgeLookup;
pub use literature::{Article, LiteratureSearch, PubMedClient, format_articles};
