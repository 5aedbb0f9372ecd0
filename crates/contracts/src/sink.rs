//! DataSink trait - downstream output interface
//!
//! Every output channel of the receiver ends in a sink.

use crate::{ContractError, Item};

/// Data output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Consume one item
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, item: &Item) -> Result<(), ContractError>;

    /// Downstream termination marker reached this sink
    async fn end_of_stream(&mut self) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
