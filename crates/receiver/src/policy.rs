//! Connection classification policies
//!
//! The flat and hierarchical receivers differ only in how a handshake token
//! classifies a connection, how an item is routed given that class and what
//! an end-of-stream marker terminates. [`ClassificationPolicy`] captures
//! those three decisions so the event loop stays variant-agnostic.

use std::collections::BTreeSet;

use contracts::{DestinationTag, Item, RoutingTable};
use tracing::debug;

use crate::error::{ReceiverError, Result};
use crate::termination::{ClassTermination, ClassTerminated};

/// Connection class, fixed at handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    /// Single-class receiver
    Flat,
    /// Sender belongs to one of the configured internal groups
    Internal,
    /// Any other sender of a two-class receiver
    External,
}

impl ConnectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionClass::Flat => "flat",
            ConnectionClass::Internal => "internal",
            ConnectionClass::External => "external",
        }
    }
}

impl std::fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No preference: the generic output (round-robin over every channel)
    Generic,
    /// A specific output channel
    Channel(usize),
}

/// Variant behaviour injected into the event loop
///
/// Implementations own their routing state (round-robin cursors, class
/// counters). They are driven from the single event-loop task only, so no
/// synchronisation is involved.
pub trait ClassificationPolicy: Send {
    /// Policy name for logs
    fn name(&self) -> &'static str;

    /// Classify a connection by its handshake token
    fn classify(&self, token: &str) -> ConnectionClass;

    /// Destination tags advertised to a connection of this class
    fn reachable_destinations(&self, class: ConnectionClass) -> Vec<DestinationTag>;

    /// A connection has been classified
    fn on_classified(&mut self, _class: ConnectionClass) {}

    /// Choose the output for an item from a connection of this class
    ///
    /// # Errors
    /// [`ReceiverError::UnknownDestination`] when the item's tag is missing
    /// from the routing table. This is fatal to the receiver.
    fn route(&mut self, item: &Item, class: ConnectionClass) -> Result<Route>;

    /// A connection of this class sent its end-of-stream marker
    ///
    /// Returns the output channels that must receive a termination marker now.
    fn on_end_of_stream(&mut self, class: ConnectionClass) -> Vec<usize>;
}

impl<P: ClassificationPolicy + ?Sized> ClassificationPolicy for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn classify(&self, token: &str) -> ConnectionClass {
        (**self).classify(token)
    }

    fn reachable_destinations(&self, class: ConnectionClass) -> Vec<DestinationTag> {
        (**self).reachable_destinations(class)
    }

    fn on_classified(&mut self, class: ConnectionClass) {
        (**self).on_classified(class)
    }

    fn route(&mut self, item: &Item, class: ConnectionClass) -> Result<Route> {
        (**self).route(item, class)
    }

    fn on_end_of_stream(&mut self, class: ConnectionClass) -> Vec<usize> {
        (**self).on_end_of_stream(class)
    }
}

fn lookup(routing: &RoutingTable, tag: DestinationTag) -> Result<usize> {
    routing
        .lookup(tag)
        .ok_or(ReceiverError::UnknownDestination { tag })
}

/// Single-class policy
///
/// Every connection sees the full routing table. Unset tags go to the generic
/// output; termination is emitted by the event loop once every expected
/// connection has finished.
#[derive(Debug, Clone)]
pub struct FlatPolicy {
    routing: RoutingTable,
}

impl FlatPolicy {
    pub fn new(routing: RoutingTable) -> Self {
        Self { routing }
    }
}

impl ClassificationPolicy for FlatPolicy {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn classify(&self, _token: &str) -> ConnectionClass {
        ConnectionClass::Flat
    }

    fn reachable_destinations(&self, _class: ConnectionClass) -> Vec<DestinationTag> {
        self.routing.destinations()
    }

    fn route(&mut self, item: &Item, _class: ConnectionClass) -> Result<Route> {
        if !item.has_destination() {
            return Ok(Route::Generic);
        }
        lookup(&self.routing, item.destination_tag).map(Route::Channel)
    }

    fn on_end_of_stream(&mut self, _class: ConnectionClass) -> Vec<usize> {
        Vec::new()
    }
}

/// Two-class policy
///
/// The last output channel is reserved for internal traffic. Internal
/// connections always deliver there; external ones route by tag or
/// round-robin over the remaining channels.
#[derive(Debug, Clone)]
pub struct HierarchicalPolicy {
    routing: RoutingTable,
    internal_destinations: Vec<DestinationTag>,
    internal_groups: BTreeSet<String>,
    output_count: usize,
    next_rr: usize,
    classes: ClassTermination,
}

impl HierarchicalPolicy {
    /// Create a two-class policy
    ///
    /// # Errors
    /// Fails when fewer than two output channels are available, since one is
    /// reserved for internal traffic.
    pub fn new(
        routing: RoutingTable,
        internal_destinations: Vec<DestinationTag>,
        internal_groups: BTreeSet<String>,
        output_count: usize,
    ) -> Result<Self> {
        if output_count < 2 {
            return Err(ReceiverError::config(format!(
                "hierarchical receiver needs at least 2 output channels, got {output_count}"
            )));
        }
        Ok(Self {
            routing,
            internal_destinations,
            internal_groups,
            output_count,
            next_rr: 0,
            classes: ClassTermination::new(),
        })
    }

    /// Index of the reserved internal channel
    pub fn internal_channel(&self) -> usize {
        self.output_count - 1
    }
}

impl ClassificationPolicy for HierarchicalPolicy {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn classify(&self, token: &str) -> ConnectionClass {
        if self.internal_groups.contains(token) {
            ConnectionClass::Internal
        } else {
            ConnectionClass::External
        }
    }

    fn reachable_destinations(&self, class: ConnectionClass) -> Vec<DestinationTag> {
        match class {
            ConnectionClass::Internal => self.internal_destinations.clone(),
            _ => self.routing.destinations(),
        }
    }

    fn on_classified(&mut self, class: ConnectionClass) {
        self.classes
            .classified(class == ConnectionClass::Internal);
    }

    fn route(&mut self, item: &Item, class: ConnectionClass) -> Result<Route> {
        if class == ConnectionClass::Internal {
            return Ok(Route::Channel(self.internal_channel()));
        }
        if item.has_destination() {
            return lookup(&self.routing, item.destination_tag).map(Route::Channel);
        }
        let channel = self.next_rr;
        self.next_rr = (self.next_rr + 1) % (self.output_count - 1);
        Ok(Route::Channel(channel))
    }

    fn on_end_of_stream(&mut self, class: ConnectionClass) -> Vec<usize> {
        match self
            .classes
            .end_of_stream(class == ConnectionClass::Internal)
        {
            Some(ClassTerminated::External) => {
                debug!("all external connections finished");
                (0..self.internal_channel()).collect()
            }
            Some(ClassTerminated::Internal) => {
                debug!("all internal connections finished");
                vec![self.internal_channel()]
            }
            None => Vec::new(),
        }
    }
}
