//! # Receiver
//!
//! Receiving endpoint of a distributed stream: accepts many upstream
//! senders, classifies each with a handshake, decodes their batches of item
//! frames and routes every item to one of the local output channels. When
//! every expected sender has sent its end-of-stream marker a termination
//! marker goes downstream and the receiver stops.
//!
//! - [`listener`]: network (TCP) and local (Unix) listening sockets
//! - [`connection`]: per-connection handshake and batch decoding task
//! - [`registry`]: open connections and their class
//! - [`policy`]: flat and hierarchical classification / routing
//! - [`router`]: output channels, round-robin and termination markers
//! - [`termination`]: end-of-stream counting
//! - [`event_loop`]: the single owner of all of the above
//!
//! ## Example
//!
//! ```ignore
//! let receiver = Receiver::flat(config, routing, dispatcher.senders())?;
//! let report = receiver.run().await?;
//! println!("{report}");
//! ```

pub mod connection;
pub mod error;
pub mod event_loop;
pub mod listener;
pub mod policy;
pub mod registry;
pub mod report;
pub mod router;
pub mod termination;

pub use connection::{CloseReason, ConnectionEvent};
pub use error::{ReceiverError, Result};
pub use event_loop::{Receiver, ReceiverConfig, ReceiverState};
pub use listener::{Accepted, Listener};
pub use policy::{ClassificationPolicy, ConnectionClass, FlatPolicy, HierarchicalPolicy, Route};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use report::ReceiverReport;
pub use router::OutputSet;
pub use termination::{ClassTerminated, ClassTermination, TerminationTracker};
