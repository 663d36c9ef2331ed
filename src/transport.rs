//! In-process transport connecting an initiator and a terminal party.
//!
//! Protocol messages are bincode-framed and travel over unbounded
//! [`tokio::sync::mpsc`] channels, one per direction; a pump task per
//! direction decodes frames and dispatches them to the party's controller.
//! This mirrors what a networked deployment would do with sockets while
//! keeping everything in one process: handlers stay synchronous and
//! non-blocking, frames are delivered reliably and in order per direction,
//! and a terminal-side protocol violation travels back as an explicit
//! [`Upstream::Aborted`] frame that fails the initiator's pending future.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::controller::{
    DivisionReceiver, DivisionSender, Error, InitiatorController, TerminalController,
};
use crate::messages::{AdditionResults, ComputationId, SquareDivisionMsg, SquareDivisionResult};

/// Frames travelling from the initiator towards the terminal party.
#[derive(Debug, Serialize, Deserialize)]
enum Downstream {
    MultiplicationForward(SquareDivisionMsg),
    AdditionForward {
        id: ComputationId,
        results: AdditionResults,
    },
    CollectOutputShares {
        id: ComputationId,
    },
}

/// Frames travelling back from the terminal party to the initiator.
#[derive(Debug, Serialize, Deserialize)]
enum Upstream {
    MultiplicationBackward(SquareDivisionMsg),
    AdditionBackward {
        id: ComputationId,
        results: AdditionResults,
    },
    OutputShares {
        id: ComputationId,
        shares: Vec<SquareDivisionResult>,
    },
    Aborted {
        id: ComputationId,
        reason: String,
    },
}

fn send_frame<T: Serialize>(tx: &UnboundedSender<Vec<u8>>, frame: &T) -> Result<(), Error> {
    let bytes = bincode::serialize(frame).map_err(|e| Error::Transport(format!("{e:?}")))?;
    tx.send(bytes)
        .map_err(|_| Error::Transport("channel closed".to_string()))
}

/// [`DivisionSender`] half handed to the initiator controller: frames each
/// downstream message onto the link.
#[derive(Debug)]
pub struct DownstreamSender {
    tx: UnboundedSender<Vec<u8>>,
}

impl DivisionSender for DownstreamSender {
    fn multiplication_forward(&self, msg: SquareDivisionMsg) -> Result<(), Error> {
        send_frame(&self.tx, &Downstream::MultiplicationForward(msg))
    }

    fn addition_forward(&self, id: ComputationId, results: AdditionResults) -> Result<(), Error> {
        send_frame(&self.tx, &Downstream::AdditionForward { id, results })
    }

    fn collect_output_shares(&self, id: ComputationId) -> Result<(), Error> {
        send_frame(&self.tx, &Downstream::CollectOutputShares { id })
    }
}

/// [`DivisionReceiver`] half handed to the terminal controller: frames each
/// upstream message onto the link.
#[derive(Debug)]
pub struct UpstreamSender {
    tx: UnboundedSender<Vec<u8>>,
}

impl UpstreamSender {
    fn abort(&self, id: ComputationId, reason: String) -> Result<(), Error> {
        send_frame(&self.tx, &Upstream::Aborted { id, reason })
    }
}

impl DivisionReceiver for UpstreamSender {
    fn multiplication_backward(&self, msg: SquareDivisionMsg) -> Result<(), Error> {
        send_frame(&self.tx, &Upstream::MultiplicationBackward(msg))
    }

    fn addition_backward(&self, id: ComputationId, results: AdditionResults) -> Result<(), Error> {
        send_frame(&self.tx, &Upstream::AdditionBackward { id, results })
    }

    fn collect_output_shares(
        &self,
        id: ComputationId,
        shares: Vec<SquareDivisionResult>,
    ) -> Result<(), Error> {
        send_frame(&self.tx, &Upstream::OutputShares { id, shares })
    }
}

/// A duplex in-process link between the two parties.
///
/// Create the link first, hand [`LocalLink::initiator_sender`] to the
/// [`InitiatorController`] and [`LocalLink::terminal_receiver`] to the
/// [`TerminalController`], then call [`LocalLink::start`] to spawn the pump
/// tasks.
#[derive(Debug)]
pub struct LocalLink {
    initiator_sender: Arc<DownstreamSender>,
    terminal_receiver: Arc<UpstreamSender>,
    down_rx: UnboundedReceiver<Vec<u8>>,
    up_rx: UnboundedReceiver<Vec<u8>>,
    up_tx: UnboundedSender<Vec<u8>>,
}

impl LocalLink {
    /// Creates a fresh, unconnected link.
    pub fn new() -> Self {
        let (down_tx, down_rx) = unbounded_channel();
        let (up_tx, up_rx) = unbounded_channel();
        LocalLink {
            initiator_sender: Arc::new(DownstreamSender { tx: down_tx }),
            terminal_receiver: Arc::new(UpstreamSender { tx: up_tx.clone() }),
            down_rx,
            up_rx,
            up_tx,
        }
    }

    /// The sending half for the initiator controller.
    pub fn initiator_sender(&self) -> Arc<DownstreamSender> {
        self.initiator_sender.clone()
    }

    /// The answering half for the terminal controller.
    pub fn terminal_receiver(&self) -> Arc<UpstreamSender> {
        self.terminal_receiver.clone()
    }

    /// Spawns the two pump tasks dispatching frames to the given
    /// controllers.
    ///
    /// The tasks run until their sending halves are dropped (i.e. until both
    /// controllers go away). Must be called within a tokio runtime.
    pub fn start(
        self,
        initiator: Arc<InitiatorController>,
        terminal: Arc<TerminalController>,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let LocalLink {
            mut down_rx,
            mut up_rx,
            up_tx,
            ..
        } = self;

        let abort = UpstreamSender { tx: up_tx };
        let downstream = tokio::spawn(async move {
            while let Some(bytes) = down_rx.recv().await {
                let frame: Downstream = match bincode::deserialize(&bytes) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = ?e, "dropping undecodable downstream frame");
                        continue;
                    }
                };
                let (id, result) = match frame {
                    Downstream::MultiplicationForward(msg) => {
                        (msg.id, terminal.multiplication_forward(msg))
                    }
                    Downstream::AdditionForward { id, results } => {
                        (id, terminal.addition_forward(id, results))
                    }
                    Downstream::CollectOutputShares { id } => {
                        (id, terminal.collect_output_shares(id))
                    }
                };
                if let Err(e) = result {
                    warn!(id = %id, error = %e, "terminal handler failed");
                    if abort.abort(id, e.to_string()).is_err() {
                        break;
                    }
                }
            }
        });

        let upstream = tokio::spawn(async move {
            while let Some(bytes) = up_rx.recv().await {
                let frame: Upstream = match bincode::deserialize(&bytes) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = ?e, "dropping undecodable upstream frame");
                        continue;
                    }
                };
                let (id, result) = match frame {
                    Upstream::MultiplicationBackward(msg) => {
                        (msg.id, initiator.multiplication_backward(msg))
                    }
                    Upstream::AdditionBackward { id, results } => {
                        (id, initiator.addition_backward(id, results))
                    }
                    Upstream::OutputShares { id, shares } => {
                        (id, initiator.collect_output_shares(id, shares))
                    }
                    Upstream::Aborted { id, reason } => {
                        initiator.abort(id, reason);
                        continue;
                    }
                };
                if let Err(e) = result {
                    initiator.abort(id, e.to_string());
                }
            }
        });

        (downstream, upstream)
    }
}

impl Default for LocalLink {
    fn default() -> Self {
        LocalLink::new()
    }
}
