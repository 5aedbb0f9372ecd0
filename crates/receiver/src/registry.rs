//! Connection Registry
//!
//! Slab-keyed table of open connections. Insertion and removal are O(1) and
//! ids of retired connections are reused.

use std::collections::HashMap;

use slab::Slab;
use tokio::task::{AbortHandle, Id as TaskId};

use crate::policy::ConnectionClass;

/// Registry key of an open connection
pub type ConnectionId = usize;

/// State the event loop keeps per open connection
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Peer address, for logs
    pub peer: String,
    /// Set once the handshake completes, immutable afterwards
    pub class: Option<ConnectionClass>,
    /// End-of-stream marker received
    pub has_signaled_eos: bool,
    task: Option<AbortHandle>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Slab<ConnectionEntry>,
    /// Serving task -> connection, for tasks that exit without a final event
    tasks: HashMap<TaskId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    ///
    /// `start` receives the new id and returns the handle of the task serving
    /// the connection.
    pub fn register<F>(&mut self, peer: String, start: F) -> ConnectionId
    where
        F: FnOnce(ConnectionId) -> AbortHandle,
    {
        let slot = self.connections.vacant_entry();
        let id = slot.key();
        let task = start(id);
        self.tasks.insert(task.id(), id);
        slot.insert(ConnectionEntry {
            peer,
            class: None,
            has_signaled_eos: false,
            task: Some(task),
        });
        id
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(id)
    }

    pub fn class_of(&self, id: ConnectionId) -> Option<ConnectionClass> {
        self.connections.get(id).and_then(|c| c.class)
    }

    /// Record the handshake classification
    ///
    /// Returns false if the connection is unknown or already classified.
    pub fn classify(&mut self, id: ConnectionId, class: ConnectionClass) -> bool {
        match self.connections.get_mut(id) {
            Some(entry) if entry.class.is_none() => {
                entry.class = Some(class);
                true
            }
            _ => false,
        }
    }

    /// Record the end-of-stream marker, returning the connection's class
    ///
    /// `None` if the connection is unknown, unclassified or already finished.
    pub fn mark_end_of_stream(&mut self, id: ConnectionId) -> Option<ConnectionClass> {
        let entry = self.connections.get_mut(id)?;
        if entry.has_signaled_eos {
            return None;
        }
        entry.has_signaled_eos = true;
        entry.class
    }

    /// Connection served by a task, if still registered
    pub fn connection_of_task(&self, task: TaskId) -> Option<ConnectionId> {
        self.tasks.get(&task).copied()
    }

    /// Deregister a connection
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.try_remove(id)?;
        if let Some(task) = &entry.task {
            self.tasks.remove(&task.id());
        }
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Abort every connection task and clear the registry
    pub fn abort_all(&mut self) -> usize {
        let count = self.connections.len();
        for (_, entry) in self.connections.iter_mut() {
            if let Some(task) = entry.task.take() {
                task.abort();
            }
        }
        self.connections.clear();
        self.tasks.clear();
        count
    }
}
