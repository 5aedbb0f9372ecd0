//! # Contracts
//!
//! Frozen interface contracts shared by every receiver crate: the item and
//! delivery model, routing table, endpoint description, configuration
//! blueprint and the downstream sink trait.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Wire Model
//! - An upstream sender pushes `Item`s tagged with a source id and an
//!   optional destination tag (`-1` = no preference)
//! - A zero-length item is an end-of-stream marker and never becomes an `Item`

mod blueprint;
mod endpoint;
mod error;
mod item;
mod routing;
mod sink;

pub use blueprint::*;
pub use endpoint::*;
pub use error::*;
pub use item::*;
pub use routing::*;
pub use sink::*;
