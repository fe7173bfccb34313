//! Shared types for the emberdb batch execution core.
//!
//! This crate holds the vocabulary that crosses the client/engine boundary:
//! opaque BLOB identifiers, statement descriptors consumed by batch gating,
//! the message-layout provider trait, and the tagged parameter-block codec.
//! It deliberately knows nothing about buffering or execution.

pub mod blob_id;
pub mod metadata;
pub mod params;
pub mod statement;

pub use blob_id::BlobId;
pub use metadata::{FieldKind, FieldSlot, FixedMetadata, MessageMetadata};
pub use params::{BlobPolicy, ParamReader, ParamTag, ParamWriter, PARAM_VERSION_1};
pub use statement::{StatementKind, StatementProfile};
