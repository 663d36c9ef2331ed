//! Message-driven orchestration of concurrent square-division computations.
//!
//! The [`InitiatorController`] lives at the querying party: it allocates
//! computation ids, creates one [`SquareDivisionInitiator`] per query, routes
//! protocol messages to the right instance and exposes each result as an
//! asynchronously fulfilled [`PendingGain`] future. The
//! [`TerminalController`] lives at the last party of the chain and never
//! originates a computation; it creates a [`SquareDivisionTerminal`] the
//! first time it sees an id and answers every subsequent message for that id
//! from the stored instance.
//!
//! All handlers are non-blocking: they return once the next protocol message
//! has been emitted or the pending future fulfilled. Messages for one id must
//! arrive in protocol order (the transport's responsibility); different ids
//! are fully independent and may be processed concurrently. Per-id state is
//! removed from both controllers once a computation completes or fails, so
//! memory stays bounded across a whole tree-induction run.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::data::DataLayer;
use crate::division::{self, SquareDivisionInitiator, SquareDivisionTerminal};
use crate::messages::{
    AdditionResults, ComputationId, GiniGainResult, NodeValuePair, SquareDivisionMsg,
    SquareDivisionResult,
};
use crate::paillier::{KeyPair, PublicKey};

/// A failure of the protocol orchestration or of one of its computations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message referenced a computation id unknown to this controller.
    #[error("unknown computation id {0}")]
    UnknownComputation(ComputationId),
    /// A square-division instance rejected a protocol step.
    #[error(transparent)]
    Division(#[from] division::Error),
    /// The computation was aborted before its future could be fulfilled.
    #[error("computation {id} aborted: {reason}")]
    Aborted {
        /// The affected computation.
        id: ComputationId,
        /// Why the computation could not complete.
        reason: String,
    },
    /// The controller fulfilling the future went away.
    #[error("result for computation {0} was dropped before fulfillment")]
    ResultDropped(ComputationId),
    /// A protocol message could not be handed to the transport.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// The sending half of the protocol chain: messages travelling from the
/// initiator towards the terminal party.
///
/// Implemented by transports, and directly by [`TerminalController`] for
/// in-process wiring.
pub trait DivisionSender: Send + Sync {
    /// Delivers the multiplication-round envelope.
    fn multiplication_forward(&self, msg: SquareDivisionMsg) -> Result<(), Error>;

    /// Delivers the addition-round forward ciphertexts.
    fn addition_forward(&self, id: ComputationId, results: AdditionResults) -> Result<(), Error>;

    /// Requests the terminal party's output shares.
    fn collect_output_shares(&self, id: ComputationId) -> Result<(), Error>;
}

/// The receiving half of the protocol chain: messages travelling back from
/// the terminal party to the initiator.
///
/// Implemented by transports, and directly by [`InitiatorController`] for
/// in-process wiring.
pub trait DivisionReceiver: Send + Sync {
    /// Delivers the multiplication-round backward envelope.
    fn multiplication_backward(&self, msg: SquareDivisionMsg) -> Result<(), Error>;

    /// Delivers the addition-round backward ciphertexts.
    fn addition_backward(&self, id: ComputationId, results: AdditionResults) -> Result<(), Error>;

    /// Delivers the terminal parties' output shares, completing the
    /// computation.
    fn collect_output_shares(
        &self,
        id: ComputationId,
        shares: Vec<SquareDivisionResult>,
    ) -> Result<(), Error>;
}

type PendingResult = Result<GiniGainResult, Error>;

/// The future returned by [`InitiatorController::compute`], fulfilled exactly
/// once when the computation's output shares have been collected (or the
/// computation failed).
#[derive(Debug)]
pub struct PendingGain {
    id: ComputationId,
    rx: oneshot::Receiver<PendingResult>,
}

impl Future for PendingGain {
    type Output = PendingResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx).poll(cx).map(|res| match res {
            Ok(result) => result,
            Err(_) => Err(Error::ResultDropped(id)),
        })
    }
}

/// Controller at the querying party, driving one square-division computation
/// per issued query.
pub struct InitiatorController {
    next_id: AtomicU64,
    keys: Arc<KeyPair>,
    data: Arc<dyn DataLayer>,
    sender: Arc<dyn DivisionSender>,
    divisions: Mutex<HashMap<ComputationId, SquareDivisionInitiator>>,
    pending: Mutex<HashMap<ComputationId, oneshot::Sender<PendingResult>>>,
}

impl InitiatorController {
    /// Creates a controller over the local partition `data`, emitting
    /// protocol messages through `sender`.
    pub fn new(data: Arc<dyn DataLayer>, sender: Arc<dyn DivisionSender>, keys: Arc<KeyPair>) -> Self {
        InitiatorController {
            next_id: AtomicU64::new(0),
            keys,
            data,
            sender,
            divisions: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issues one secure `(attribute, value)` evaluation and returns the
    /// future of its result without blocking.
    ///
    /// Repeated calls with identical arguments produce independent
    /// computations with fresh ids.
    pub fn compute(
        &self,
        attr_name: &str,
        attr_value: &str,
        path: &[NodeValuePair],
    ) -> PendingGain {
        let id = ComputationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(id = %id, attr = attr_name, value = attr_value, "starting secure gain computation");

        let counts = self.data.count_per_class_value(path, attr_name, attr_value);

        let mut division = SquareDivisionInitiator::new(self.keys.clone());
        let results = division.start_multiplications(&counts);
        self.divisions
            .lock()
            .expect("poison")
            .insert(id, division);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("poison").insert(id, tx);

        let msg = SquareDivisionMsg {
            id,
            attr_name: attr_name.to_string(),
            attr_value: attr_value.to_string(),
            path: path.to_vec(),
            results,
        };
        if let Err(e) = self.sender.multiplication_forward(msg) {
            self.abort(id, e.to_string());
        }

        PendingGain { id, rx }
    }

    /// Fails the pending computation `id`, removing all of its state.
    ///
    /// Called by transports when the remote side reports a protocol
    /// violation, and internally whenever a handler for a known id errors.
    pub fn abort(&self, id: ComputationId, reason: String) {
        warn!(id = %id, reason = %reason, "aborting computation");
        self.divisions.lock().expect("poison").remove(&id);
        if let Some(tx) = self.pending.lock().expect("poison").remove(&id) {
            let _ = tx.send(Err(Error::Aborted { id, reason }));
        }
    }

    fn with_division<T>(
        &self,
        id: ComputationId,
        f: impl FnOnce(&mut SquareDivisionInitiator) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut divisions = self.divisions.lock().expect("poison");
        let division = divisions
            .get_mut(&id)
            .ok_or(Error::UnknownComputation(id))?;
        f(division)
    }
}

impl DivisionReceiver for InitiatorController {
    fn multiplication_backward(&self, msg: SquareDivisionMsg) -> Result<(), Error> {
        let results =
            self.with_division(msg.id, |d| Ok(d.multiplication_backward(&msg.results)?))?;
        self.sender.addition_forward(msg.id, results)
    }

    fn addition_backward(&self, id: ComputationId, results: AdditionResults) -> Result<(), Error> {
        self.with_division(id, |d| Ok(d.addition_backward(&results)?))?;
        self.sender.collect_output_shares(id)
    }

    fn collect_output_shares(
        &self,
        id: ComputationId,
        shares: Vec<SquareDivisionResult>,
    ) -> Result<(), Error> {
        // Final step: the instance is consumed and all per-id state released.
        let division = self
            .divisions
            .lock()
            .expect("poison")
            .remove(&id)
            .ok_or(Error::UnknownComputation(id))?;
        let result = division.compute_result(&shares).map_err(Error::from);
        debug!(id = %id, "computation complete");

        let tx = self
            .pending
            .lock()
            .expect("poison")
            .remove(&id)
            .ok_or(Error::UnknownComputation(id))?;
        // The caller dropping its future is not a protocol error.
        let _ = tx.send(result);
        Ok(())
    }
}

/// Controller at the terminal party of the chain.
///
/// Handles each downstream message by delegating to the stored
/// [`SquareDivisionTerminal`] instance and immediately emits the answering
/// upstream message through its [`DivisionReceiver`].
pub struct TerminalController {
    key: PublicKey,
    data: Arc<dyn DataLayer>,
    receiver: Arc<dyn DivisionReceiver>,
    divisions: Mutex<HashMap<ComputationId, SquareDivisionTerminal>>,
}

impl TerminalController {
    /// Creates a controller over the local partition `data`, answering
    /// through `receiver`.
    pub fn new(
        data: Arc<dyn DataLayer>,
        receiver: Arc<dyn DivisionReceiver>,
        key: PublicKey,
    ) -> Self {
        TerminalController {
            key,
            data,
            receiver,
            divisions: Mutex::new(HashMap::new()),
        }
    }

    fn with_division<T>(
        &self,
        id: ComputationId,
        f: impl FnOnce(&mut SquareDivisionTerminal) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut divisions = self.divisions.lock().expect("poison");
        let division = divisions
            .get_mut(&id)
            .ok_or(Error::UnknownComputation(id))?;
        f(division)
    }
}

impl DivisionSender for TerminalController {
    fn multiplication_forward(&self, msg: SquareDivisionMsg) -> Result<(), Error> {
        debug!(id = %msg.id, attr = %msg.attr_name, "answering multiplication round");
        let counts = self
            .data
            .count_per_class_value(&msg.path, &msg.attr_name, &msg.attr_value);

        let mut division = SquareDivisionTerminal::new(self.key.clone());
        // Terminal party is the last hop: forward and backward step happen in
        // the same handler invocation.
        let forward = division.multiplication_forward(&counts, &msg.results)?;
        let backward = division.multiplication_backward(&forward)?;
        self.divisions
            .lock()
            .expect("poison")
            .insert(msg.id, division);

        self.receiver.multiplication_backward(SquareDivisionMsg {
            results: backward,
            ..msg
        })
    }

    fn addition_forward(&self, id: ComputationId, results: AdditionResults) -> Result<(), Error> {
        let backward = self.with_division(id, |d| {
            let forward = d.addition_forward(&results)?;
            Ok(d.addition_backward(&forward)?)
        })?;
        self.receiver.addition_backward(id, backward)
    }

    fn collect_output_shares(&self, id: ComputationId) -> Result<(), Error> {
        // Final message for this id; release the instance.
        let division = self
            .divisions
            .lock()
            .expect("poison")
            .remove(&id)
            .ok_or(Error::UnknownComputation(id))?;
        let shares = vec![division.output_shares()?];
        self.receiver.collect_output_shares(id, shares)
    }
}
