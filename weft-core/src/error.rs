//! Error Types
//!
//! All fallible operations in the render layer return [`RenderError`].
//! The tag and tracking layer is deliberately infallible: it is pure
//! arithmetic over an in-memory counter and exposes no `Result` surface.
//!
//! There are no retries anywhere in this crate. An error raised while
//! applying a DOM effect propagates out of the running pass immediately;
//! mutations already applied earlier in the same pass are left as-is.

use thiserror::Error;

/// Errors produced while building references, iterating collections, or
/// draining a program.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A list op was compiled without a key. Every keyed iteration needs
    /// `@index`, `@identity`, or the name of an item property.
    #[error("list iteration requires a key (`@index`, `@identity`, or a property name)")]
    MissingIterationKey,

    /// The value a list op resolved to cannot be enumerated.
    #[error("cannot iterate over `{type_name}`")]
    NotIterable {
        /// Type name of the offending value.
        type_name: &'static str,
    },

    /// An item did not provide a usable value for the configured key
    /// property.
    #[error("item at index {index} has no usable `{property}` key")]
    MissingItemKey {
        /// The key property configured for the iteration.
        property: String,
        /// Position of the offending item in the source collection.
        index: usize,
    },

    /// An expression referenced a helper that was never registered.
    #[error("no helper named `{0}` is registered")]
    UnknownHelper(String),

    /// An `item`-headed path was evaluated outside of a list body.
    #[error("`item` paths are only valid inside a list body")]
    ItemPathOutsideList,
}
