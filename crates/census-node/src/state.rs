use std::time::Instant;
use tokio::sync::mpsc;

use crate::commands::NodeCommand;

/// State shared with the HTTP handlers.
pub struct NodeState {
    pub command_tx: mpsc::Sender<NodeCommand>,
    pub start_time: Instant,
}

impl NodeState {
    pub fn new(command_tx: mpsc::Sender<NodeCommand>) -> Self {
        Self {
            command_tx,
            start_time: Instant::now(),
        }
    }
}
