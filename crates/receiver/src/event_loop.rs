//! Event Loop
//!
//! One task owns the listener, the connection registry, the policy, the
//! output channels and the termination tracker. It waits on two sources:
//! the listener (new connections) and the shared queue fed by connection
//! tasks. Events from one connection arrive in the order the connection
//! produced them.
//!
//! ```text
//! Initializing -> Listening <-> Processing -> Draining -> Stopped
//! ```
//!
//! All state here is single-owner. Handling connections on several event
//! loops requires sharding connections across independent receivers, the
//! counters are not shareable.

use std::collections::BTreeSet;
use std::time::Instant;

use contracts::{Delivery, DestinationTag, Endpoint, ReceiverBlueprint, RoutingTable};
use observability::metrics;
use protocol::FrameLimits;
use tokio::sync::mpsc;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::connection::{serve_connection, CloseReason, ConnectionEvent};
use crate::error::{ReceiverError, Result};
use crate::listener::{Accepted, Listener};
use crate::policy::{ClassificationPolicy, FlatPolicy, HierarchicalPolicy};
use crate::registry::ConnectionRegistry;
use crate::report::ReceiverReport;
use crate::router::OutputSet;
use crate::termination::TerminationTracker;

/// Lifecycle of a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Initializing,
    /// Waiting for a connection or a connection event
    Listening,
    /// Handling one event
    Processing,
    /// Every expected connection finished, shutting down
    Draining,
    Stopped,
}

/// Construction parameters of a receiver
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Accept endpoint
    pub endpoint: Endpoint,
    /// Expected number of end-of-stream markers
    pub input_channels: usize,
    /// Listen backlog
    pub backlog: u32,
    /// Capacity of the connection event queue
    pub event_queue_capacity: usize,
    /// Frame size ceilings
    pub limits: FrameLimits,
}

impl ReceiverConfig {
    pub fn new(endpoint: Endpoint, input_channels: usize) -> Self {
        Self {
            endpoint,
            input_channels,
            backlog: 128,
            event_queue_capacity: 1024,
            limits: FrameLimits::default(),
        }
    }

    pub fn from_blueprint(blueprint: &ReceiverBlueprint) -> Self {
        let settings = &blueprint.receiver;
        Self {
            endpoint: settings.endpoint.clone(),
            input_channels: settings.input_channels,
            backlog: settings.backlog,
            event_queue_capacity: settings.event_queue_capacity,
            limits: FrameLimits {
                max_token_bytes: settings.max_token_bytes,
                max_payload_bytes: settings.max_payload_bytes,
            },
        }
    }
}

/// A receiver node parameterised by its classification policy
pub struct Receiver<P> {
    config: ReceiverConfig,
    policy: P,
    outputs: OutputSet,
    registry: ConnectionRegistry,
    tracker: TerminationTracker,
    state: ReceiverState,
    report: ReceiverReport,
}

impl Receiver<FlatPolicy> {
    /// Single-class receiver
    pub fn flat(
        config: ReceiverConfig,
        routing: RoutingTable,
        outputs: Vec<mpsc::Sender<Delivery>>,
    ) -> Result<Self> {
        check_routing(&routing, outputs.len())?;
        Self::new(config, FlatPolicy::new(routing), outputs)
    }
}

impl Receiver<HierarchicalPolicy> {
    /// Two-class receiver, the last output channel is reserved for internal traffic
    pub fn hierarchical(
        config: ReceiverConfig,
        routing: RoutingTable,
        internal_destinations: Vec<DestinationTag>,
        internal_groups: BTreeSet<String>,
        outputs: Vec<mpsc::Sender<Delivery>>,
    ) -> Result<Self> {
        check_routing(&routing, outputs.len())?;
        let policy =
            HierarchicalPolicy::new(routing, internal_destinations, internal_groups, outputs.len())?;
        Self::new(config, policy, outputs)
    }
}

impl Receiver<Box<dyn ClassificationPolicy>> {
    /// Build the variant the blueprint describes
    pub fn from_blueprint(
        blueprint: &ReceiverBlueprint,
        outputs: Vec<mpsc::Sender<Delivery>>,
    ) -> Result<Self> {
        let config = ReceiverConfig::from_blueprint(blueprint);
        let routing = blueprint.routing_table();
        check_routing(&routing, outputs.len())?;

        let policy: Box<dyn ClassificationPolicy> = match &blueprint.hierarchical {
            Some(h) => Box::new(HierarchicalPolicy::new(
                routing,
                h.internal_destinations.clone(),
                h.internal_groups.clone(),
                outputs.len(),
            )?),
            None => Box::new(FlatPolicy::new(routing)),
        };
        Self::new(config, policy, outputs)
    }
}

fn check_routing(routing: &RoutingTable, outputs: usize) -> Result<()> {
    match routing.iter().find(|&(_, channel)| channel >= outputs) {
        Some((tag, channel)) => Err(ReceiverError::config(format!(
            "destination tag {tag} maps to channel {channel} but only {outputs} outputs exist"
        ))),
        None => Ok(()),
    }
}

impl<P: ClassificationPolicy> Receiver<P> {
    /// Receiver with a custom policy
    pub fn new(
        config: ReceiverConfig,
        policy: P,
        outputs: Vec<mpsc::Sender<Delivery>>,
    ) -> Result<Self> {
        if config.input_channels == 0 {
            return Err(ReceiverError::config("input_channels must be at least 1"));
        }
        if config.event_queue_capacity == 0 {
            return Err(ReceiverError::config("event_queue_capacity must be at least 1"));
        }
        let outputs = OutputSet::new(outputs)?;
        let report = ReceiverReport::new(policy.name(), outputs.len());
        Ok(Self {
            tracker: TerminationTracker::new(config.input_channels),
            config,
            policy,
            outputs,
            registry: ConnectionRegistry::new(),
            state: ReceiverState::Initializing,
            report,
        })
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Bind the configured endpoint and serve until every expected
    /// connection has finished
    ///
    /// # Errors
    /// Startup failures and [`ReceiverError::UnknownDestination`]
    pub async fn run(self) -> Result<ReceiverReport> {
        let listener = Listener::bind(&self.config.endpoint, self.config.backlog).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    #[instrument(
        name = "receiver_run",
        skip_all,
        fields(endpoint = %listener.local_endpoint(), policy = self.policy.name())
    )]
    pub async fn serve(mut self, listener: Listener) -> Result<ReceiverReport> {
        let started = Instant::now();
        let (events_tx, mut events_rx) = mpsc::channel(self.config.event_queue_capacity);
        let mut tasks = JoinSet::new();

        info!(
            input_channels = self.config.input_channels,
            outputs = self.outputs.len(),
            "receiver started"
        );
        self.transition(ReceiverState::Listening);

        let outcome = loop {
            if self.tracker.is_complete() {
                break Ok(());
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.accept(stream, peer, &events_tx, &mut tasks);
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(event) = events_rx.recv() => {
                    self.transition(ReceiverState::Processing);
                    if let Err(e) = self.handle_event(event).await {
                        error!(error = %e, "fatal error, stopping receiver");
                        break Err(e);
                    }
                    self.transition(ReceiverState::Listening);
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            self.retire_panicked(e.id(), &e);
                        }
                    }
                }
            }
        };

        self.transition(ReceiverState::Draining);
        let aborted = self.registry.abort_all();
        if aborted > 0 {
            debug!(aborted, "aborting remaining connections");
        }
        tasks.shutdown().await;
        drop(listener);
        metrics::record_open_connections(0);

        let result = match outcome {
            Ok(()) => {
                let sent = self.outputs.terminate_all().await;
                sent.map(|channels| self.report.terminated_channels.extend(channels))
            }
            Err(e) => Err(e),
        };

        self.transition(ReceiverState::Stopped);
        self.report.final_state = self.state;
        self.report.duration = started.elapsed();
        result?;

        info!(
            items = self.report.items_forwarded(),
            end_of_stream = self.report.end_of_stream,
            "receiver stopped"
        );
        Ok(self.report)
    }

    fn transition(&mut self, next: ReceiverState) {
        if self.state == next {
            return;
        }
        match next {
            ReceiverState::Listening | ReceiverState::Processing => {
                trace!(from = ?self.state, to = ?next, "state")
            }
            _ => info!(from = ?self.state, to = ?next, "state"),
        }
        self.state = next;
    }

    fn accept(
        &mut self,
        stream: Accepted,
        peer: String,
        events: &mpsc::Sender<ConnectionEvent>,
        tasks: &mut JoinSet<()>,
    ) {
        let limits = self.config.limits;
        let transport = match &stream {
            Accepted::Tcp(_) => "tcp",
            Accepted::Unix(_) => "unix",
        };
        let conn = self.registry.register(peer.clone(), |conn| {
            let events = events.clone();
            match stream {
                Accepted::Tcp(s) => tasks.spawn(serve_connection(conn, s, events, limits)),
                Accepted::Unix(s) => tasks.spawn(serve_connection(conn, s, events, limits)),
            }
        });

        self.report.connections_accepted += 1;
        metrics::record_connection_accepted(transport);
        metrics::record_open_connections(self.registry.len());
        debug!(conn, peer = %peer, "connection accepted");
    }

    /// A serving task died without its final event, so nothing else will
    /// deregister the connection
    fn retire_panicked(&mut self, task: TaskId, e: &JoinError) {
        let Some(conn) = self.registry.connection_of_task(task) else {
            error!(error = %e, "connection task panicked");
            return;
        };
        let peer = self.registry.remove(conn).map(|entry| entry.peer).unwrap_or_default();
        error!(conn, peer = %peer, error = %e, "connection task panicked, connection retired");
        self.report.connections_failed += 1;
        metrics::record_connection_closed("panicked");
        metrics::record_open_connections(self.registry.len());
    }

    async fn handle_event(&mut self, event: ConnectionEvent) -> Result<()> {
        match event {
            ConnectionEvent::Handshake { conn, token, reply } => {
                let class = self.policy.classify(&token);
                if !self.registry.classify(conn, class) {
                    warn!(conn, "handshake from unknown or classified connection");
                    return Ok(());
                }
                self.policy.on_classified(class);
                self.report.record_handshake(class);
                metrics::record_handshake(class.as_str());

                let destinations = self.policy.reachable_destinations(class);
                debug!(conn, token = %token, class = %class, destinations = ?destinations, "handshake");
                if reply.send(destinations).is_err() {
                    debug!(conn, "connection gone before handshake reply");
                }
            }
            ConnectionEvent::Batch { conn, request_size } => {
                trace!(conn, request_size, "batch");
                self.report.record_batch(request_size);
                metrics::record_batch(request_size);
            }
            ConnectionEvent::Item { conn, item } => {
                let Some(class) = self.registry.class_of(conn) else {
                    warn!(conn, "item from unclassified connection dropped");
                    return Ok(());
                };
                let route = self.policy.route(&item, class)?;
                let len = item.len();
                let tag = item.destination_tag;
                let channel = self.outputs.send(route, item).await?;
                trace!(conn, tag, channel, len, "item forwarded");
                self.report.record_item(channel, len);
                metrics::record_item_forwarded(channel, len);
            }
            ConnectionEvent::EndOfStream { conn, source_id } => {
                let class = self.registry.mark_end_of_stream(conn);
                if let Some(entry) = self.registry.remove(conn) {
                    debug!(conn, peer = %entry.peer, source_id, "end-of-stream");
                }
                metrics::record_connection_closed("end_of_stream");
                metrics::record_open_connections(self.registry.len());

                let Some(class) = class else {
                    warn!(conn, "end-of-stream from unclassified connection ignored");
                    return Ok(());
                };
                self.report.end_of_stream += 1;
                metrics::record_end_of_stream(class.as_str());
                let complete = self.tracker.register();
                debug!(
                    received = self.tracker.received(),
                    expected = self.tracker.expected(),
                    complete,
                    "end-of-stream counted"
                );

                for channel in self.policy.on_end_of_stream(class) {
                    if self.outputs.terminate(channel).await? {
                        self.report.terminated_channels.push(channel);
                    }
                }
            }
            ConnectionEvent::Closed { conn, reason } => {
                match &reason {
                    CloseReason::PeerClosed => self.report.connections_closed += 1,
                    CloseReason::HandshakeFailed(_) | CloseReason::Failed(_) => {
                        self.report.connections_failed += 1
                    }
                }
                let peer = self.registry.remove(conn).map(|e| e.peer).unwrap_or_default();
                match &reason {
                    CloseReason::PeerClosed => debug!(conn, peer = %peer, "connection closed by peer"),
                    CloseReason::HandshakeFailed(e) => {
                        warn!(conn, peer = %peer, error = %e, "handshake failed, connection closed")
                    }
                    CloseReason::Failed(e) => {
                        warn!(conn, peer = %peer, error = %e, "connection failed, closed")
                    }
                }
                metrics::record_connection_closed(reason.as_str());
                metrics::record_open_connections(self.registry.len());
            }
        }
        Ok(())
    }
}
