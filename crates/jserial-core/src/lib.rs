//! # jserial-core
//!
//! A library for decoding Java object serialization streams without a JVM.
//!
//! This crate provides the core functionality for:
//! - Decoding every record of a serialization stream into an inspectable model
//! - Recovering from exceptions the writer serialized mid-stream
//! - Reconnecting inner and static member classes to their outer classes
//! - Rendering content listings, class declarations and instance dumps
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`stream`]: Byte cursor, opcode dispatch and the decode session
//! - [`model`]: Decoded entities, the handle table and type descriptors
//! - [`connect`]: Member-class reconnection
//! - [`render`]: Text output and content visitors
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use jserial_core::{ObjectStream, RenderConfig, Renderer};
//!
//! let data = std::fs::read("./session.ser")?;
//! let stream = ObjectStream::from_bytes(&data)?;
//!
//! let config = RenderConfig::default();
//! let renderer = Renderer::new(&stream, &config);
//! print!("{}", renderer.class_declarations());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`ContentVisitor`]: Walk every decoded entity
//! - [`DecoderConfig`] / [`RenderConfig`]: Tune decoding and output
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod connect;
pub mod error;
pub mod model;
pub mod render;
pub mod stream;

#[cfg(test)]
mod testutil;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use model::{
    ArrayObj, BlockData, ClassData, ClassDesc, ClassDescKind, ClassFlags, ClassObj, Content,
    ContentId, Contents, EnumObj, ExceptionState, Field, FieldType, Generation, Handle, Instance,
    StringObj, Value,
};
pub use render::{ContentVisitor, RenderConfig, Renderer, StreamStats};
pub use stream::{DecoderConfig, Deserializer, ObjectStream, STREAM_HEADER};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
