//! Transform definitions and the named transform registry.
//!
//! ```text
//! directive name ──► TransformRegistry ──► TransformEntry
//!                                            ├─ Single(TransformationSpec)
//!                                            └─ Group(Vec<TransformationSpec>)
//! ```
//!
//! The registry is configuration: it is loaded once at startup and shared
//! behind an `Arc` without any mutation API.

mod registry;
mod spec;

pub use registry::TransformRegistry;
pub use spec::{
    flatten, Dimension, Gravity, OperationDescriptor, ResizeKernel, ResizeMode, TransformEntry,
    TransformationSpec,
};
