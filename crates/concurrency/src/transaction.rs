//! Transaction coordinator
//!
//! A [`Transaction`] owns one unit of work: the enlisted participants, the
//! completion listeners, the status and the timeout. It drives the
//! participants through two-phase commit or rollback.
//!
//! ## State Machine
//!
//! ```text
//! ACTIVE ──set_rollback_only──► MARKED_ROLLBACK
//!   │                               │
//!   │ commit                        │ rollback
//!   ▼                               ▼
//! PREPARING ──all voted──► PREPARED ─► COMMITTING ─► COMMITTED
//!   │
//!   └─prepare failed─► ROLLING_BACK ─► ROLLEDBACK ◄── (rollback from ACTIVE)
//! ```
//!
//! Status only moves forward. `COMMITTED` and `ROLLEDBACK` are set once the
//! pass over the participants finishes, whether or not individual calls
//! failed; failures after the point of no return surface as
//! [`TransactionError::PartialOutcome`].
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. before_completion() on every listener (errors logged, pass continues)
//! 2. PREPARING: end(SUCCESS) + prepare() on every participant in order
//!      OK             -> keep for commit
//!      READ_ONLY      -> drop
//!      unknown vote   -> prepare failed, keep for rollback
//!      rollback-class -> prepare failed, drop (branch already rolled back)
//!      other error    -> prepare failed, keep for rollback
//! 3. participants := kept set
//! 4. IF prepare failed: rollback pass, fail with PrepareFailed
//! 5. PREPARED, COMMITTING: commit(one_phase = false) on every kept participant
//! 6. COMMITTED; any commit failure -> PartialOutcome
//! 7. after_completion(final status) on every listener
//! ```
//!
//! # Thread Safety
//!
//! All state lives behind one mutex. Participant calls are made with the
//! lock held; listener callbacks are made with it released. The status is
//! also kept in an atomic so it can be read while the coordinator is busy.
//! Once commit or rollback starts the transaction is *completing* and
//! concurrent calls fail with `IllegalState` instead of interleaving.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use xatm_core::{
    CompletionListener, CompletionPhase, EndFlag, Participant, Result, StartFlags, Status,
    TransactionError, TransactionId, Vote, XaError,
};

/// Timeout used when none is configured or zero is requested
pub const DEFAULT_TIMEOUT_SECS: u32 = 30;

struct TransactionState {
    participants: Vec<Arc<dyn Participant>>,
    listeners: Vec<Arc<dyn CompletionListener>>,
    timeout_secs: u32,
    completing: bool,
    history: Vec<Status>,
}

/// One unit of work coordinated with two-phase commit.
pub struct Transaction {
    xid: TransactionId,
    default_timeout_secs: u32,
    status: AtomicU8,
    possibly_inconsistent: AtomicBool,
    state: Mutex<TransactionState>,
}

fn same_participant(a: &Arc<dyn Participant>, b: &Arc<dyn Participant>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn same_listener(a: &Arc<dyn CompletionListener>, b: &Arc<dyn CompletionListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl Transaction {
    /// Create an active transaction with the default 30 second timeout
    pub fn new(xid: TransactionId) -> Self {
        Self::with_default_timeout(xid, DEFAULT_TIMEOUT_SECS)
    }

    /// Create an active transaction with a different default timeout
    ///
    /// A zero default falls back to [`DEFAULT_TIMEOUT_SECS`].
    pub fn with_default_timeout(xid: TransactionId, default_timeout_secs: u32) -> Self {
        let default_timeout_secs = if default_timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            default_timeout_secs
        };
        Transaction {
            xid,
            default_timeout_secs,
            status: AtomicU8::new(Status::Active.code()),
            possibly_inconsistent: AtomicBool::new(false),
            state: Mutex::new(TransactionState {
                participants: Vec::new(),
                listeners: Vec::new(),
                timeout_secs: default_timeout_secs,
                completing: false,
                history: vec![Status::Active],
            }),
        }
    }

    /// Transaction identifier
    pub fn xid(&self) -> &TransactionId {
        &self.xid
    }

    /// Current status; readable while the coordinator is driving participants
    pub fn status(&self) -> Status {
        Status::from_code(self.status.load(Ordering::SeqCst)).unwrap_or(Status::Unknown)
    }

    /// Every status this transaction has been in, oldest first
    pub fn history(&self) -> Vec<Status> {
        self.state.lock().history.clone()
    }

    /// Effective timeout in seconds
    pub fn timeout_secs(&self) -> u32 {
        self.state.lock().timeout_secs
    }

    /// Number of enlisted participants.
    ///
    /// After commit this is the set that survived the prepare phase.
    pub fn participant_count(&self) -> usize {
        self.state.lock().participants.len()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// A commit or rollback pass ended with some participants failing
    pub fn is_possibly_inconsistent(&self) -> bool {
        self.possibly_inconsistent.load(Ordering::SeqCst)
    }

    // Caller must hold the state lock; taking `&mut TransactionState` proves it.
    fn set_status(&self, state: &mut TransactionState, status: Status) {
        trace!(xid = %self.xid, %status, "Status transition");
        self.status.store(status.code(), Ordering::SeqCst);
        state.history.push(status);
    }

    fn check_accepting(&self, state: &TransactionState, operation: &'static str) -> Result<()> {
        let status = self.status();
        if status == Status::MarkedRollback {
            debug!(xid = %self.xid, operation, "Transaction is marked for rollback");
            return Err(TransactionError::MarkedForRollback { operation });
        }
        if status != Status::Active || state.completing {
            debug!(xid = %self.xid, operation, %status, "Transaction is not active");
            return Err(TransactionError::IllegalState { operation, status });
        }
        Ok(())
    }

    /* ***************************** */
    /* *** PARTICIPANTS ************ */
    /* ***************************** */

    /// Enlist a participant
    ///
    /// Sets the participant's timeout to the transaction timeout and starts
    /// its branch. The participant is only added if both calls succeed.
    ///
    /// # Errors
    ///
    /// - `MarkedForRollback` if the transaction is doomed
    /// - `IllegalState` if it is not active
    /// - `AlreadyEnlisted` if the same participant was enlisted before
    /// - `ResourceManager` if the participant rejects the timeout or start
    pub fn enlist(&self, participant: Arc<dyn Participant>) -> Result<()> {
        trace!(xid = %self.xid, "enlist()");
        let mut state = self.state.lock();
        self.check_accepting(&state, "enlist")?;

        if state
            .participants
            .iter()
            .any(|enlisted| same_participant(enlisted, &participant))
        {
            debug!(xid = %self.xid, "Participant already enlisted");
            return Err(TransactionError::AlreadyEnlisted);
        }

        let started = participant
            .set_transaction_timeout(state.timeout_secs)
            .and_then(|_| participant.start(&self.xid, StartFlags::NoFlags));
        if let Err(source) = started {
            warn!(xid = %self.xid, code = source.code, error = %source, "Could not start branch on participant");
            return Err(TransactionError::ResourceManager {
                operation: "enlist",
                source,
            });
        }

        state.participants.push(participant);
        debug!(xid = %self.xid, enlisted = state.participants.len(), "Participant enlisted");
        Ok(())
    }

    /// Delisting participants is not supported
    pub fn delist(&self, _participant: &Arc<dyn Participant>, _flag: EndFlag) -> Result<()> {
        trace!(xid = %self.xid, "delist()");
        Err(TransactionError::NotSupported("delist resource"))
    }

    /// Register a completion listener
    ///
    /// Listeners form a set: registering the same listener again is a no-op,
    /// so each listener is notified once per completion.
    ///
    /// # Errors
    ///
    /// `MarkedForRollback` if the transaction is doomed, `IllegalState` if it
    /// is not active.
    pub fn register_listener(&self, listener: Arc<dyn CompletionListener>) -> Result<()> {
        trace!(xid = %self.xid, "register_listener()");
        let mut state = self.state.lock();
        self.check_accepting(&state, "register listener")?;
        if state
            .listeners
            .iter()
            .any(|registered| same_listener(registered, &listener))
        {
            debug!(xid = %self.xid, "Listener already registered");
            return Ok(());
        }
        state.listeners.push(listener);
        Ok(())
    }

    /* ***************************** */
    /* *** STATUS & TIMEOUT ******** */
    /* ***************************** */

    /// Doom the transaction; idempotent
    pub fn set_rollback_only(&self) -> Result<()> {
        trace!(xid = %self.xid, "set_rollback_only()");
        let mut state = self.state.lock();
        let status = self.status();
        if !status.can_rollback() {
            debug!(xid = %self.xid, %status, "set rollback only not possible");
            return Err(TransactionError::IllegalState {
                operation: "set rollback only",
                status,
            });
        }
        if status == Status::Active {
            self.set_status(&mut state, Status::MarkedRollback);
        }
        Ok(())
    }

    /// Change the timeout and propagate it to every enlisted participant
    ///
    /// Zero restores the default. The new value is kept even if propagation
    /// to a participant fails; propagation stops at the first failure.
    ///
    /// # Errors
    ///
    /// - `InvalidTimeout` for negative values or values beyond `u32::MAX`;
    ///   the previous timeout is retained
    /// - `ResourceManager` if a participant rejects the new timeout
    pub fn set_timeout(&self, seconds: i64) -> Result<()> {
        trace!(xid = %self.xid, seconds, "set_timeout()");
        let timeout = match seconds {
            s if s < 0 => {
                debug!(xid = %self.xid, seconds, "Timeout may not be negative");
                return Err(TransactionError::InvalidTimeout(seconds));
            }
            0 => self.default_timeout_secs,
            s => u32::try_from(s).map_err(|_| TransactionError::InvalidTimeout(seconds))?,
        };

        let mut state = self.state.lock();
        state.timeout_secs = timeout;
        for participant in &state.participants {
            if let Err(source) = participant.set_transaction_timeout(timeout) {
                warn!(xid = %self.xid, code = source.code, error = %source, "Could not set timeout on participant");
                return Err(TransactionError::ResourceManager {
                    operation: "set timeout",
                    source,
                });
            }
        }
        Ok(())
    }

    /* ***************************** */
    /* *** COMMIT/ROLLBACK ********* */
    /* ***************************** */

    /// Commit with two-phase commit
    ///
    /// # Errors
    ///
    /// - `MarkedForRollback` if the transaction is doomed (nothing is rolled
    ///   back; call [`rollback`](Self::rollback)), or if a listener doomed it
    ///   during `before_completion` (it has been rolled back)
    /// - `IllegalState` if it is not active or already completing
    /// - `PrepareFailed` if a participant could not prepare; the transaction
    ///   has been rolled back
    /// - `PartialOutcome` if some participants failed to commit or roll back
    pub fn commit(&self) -> Result<()> {
        trace!(xid = %self.xid, "commit()");
        let listeners = {
            let mut state = self.state.lock();
            self.check_accepting(&state, "commit")?;
            state.completing = true;
            state.listeners.clone()
        };

        self.notify_before_completion(&listeners);

        let outcome = {
            let mut state = self.state.lock();
            if self.status() == Status::MarkedRollback {
                debug!(xid = %self.xid, "Marked for rollback during before completion; rolling back");
                self.rollback_participants(&mut state)
                    .and(Err(TransactionError::MarkedForRollback { operation: "commit" }))
            } else {
                self.two_phase_commit(&mut state)
            }
        };

        self.notify_after_completion(&listeners, self.status());
        outcome
    }

    /// Roll back every enlisted participant
    ///
    /// # Errors
    ///
    /// - `IllegalState` unless active or marked for rollback
    /// - `PartialOutcome` if some participants failed to roll back
    pub fn rollback(&self) -> Result<()> {
        trace!(xid = %self.xid, "rollback()");
        let (listeners, outcome) = {
            let mut state = self.state.lock();
            let status = self.status();
            if !status.can_rollback() || state.completing {
                debug!(xid = %self.xid, %status, "rollback not possible");
                return Err(TransactionError::IllegalState {
                    operation: "rollback",
                    status,
                });
            }
            state.completing = true;
            let outcome = self.rollback_participants(&mut state);
            (state.listeners.clone(), outcome)
        };

        self.notify_after_completion(&listeners, self.status());
        outcome
    }

    fn prepare_participant(&self, participant: &Arc<dyn Participant>) -> std::result::Result<Vote, XaError> {
        debug!(xid = %self.xid, "Calling xa_end(SUCCESS)");
        participant.end(&self.xid, EndFlag::Success)?;
        debug!(xid = %self.xid, "Calling xa_prepare");
        participant.prepare(&self.xid)
    }

    fn two_phase_commit(&self, state: &mut TransactionState) -> Result<()> {
        trace!(xid = %self.xid, "Starting prepare of two-phase commit");
        self.set_status(state, Status::Preparing);

        let mut ok = true;
        let mut prepared: Vec<Arc<dyn Participant>> = Vec::with_capacity(state.participants.len());
        for participant in &state.participants {
            match self.prepare_participant(participant) {
                Ok(Vote::Ok) => {
                    debug!(xid = %self.xid, "Prepare voted OK; participant kept for commit");
                    prepared.push(participant.clone());
                }
                Ok(Vote::ReadOnly) => {
                    debug!(xid = %self.xid, "Prepare voted read-only; participant skipped for commit");
                }
                Ok(Vote::Unknown(code)) => {
                    ok = false;
                    error!(xid = %self.xid, code, "Unknown result from prepare; participant kept for rollback");
                    prepared.push(participant.clone());
                }
                Err(e) if e.is_rollback_class() => {
                    ok = false;
                    debug!(xid = %self.xid, code = e.code, error = %e, "Participant rolled back during prepare");
                }
                Err(e) => {
                    ok = false;
                    warn!(xid = %self.xid, code = e.code, error = %e, "Participant failed prepare; participant kept for rollback");
                    prepared.push(participant.clone());
                }
            }
        }
        debug!(xid = %self.xid, ok, prepared = prepared.len(), "Prepare of two-phase commit completed");

        state.participants = prepared;

        if !ok {
            debug!(xid = %self.xid, "Transaction could not be prepared; rolling back");
            self.rollback_participants(state)?;
            return Err(TransactionError::PrepareFailed {
                xid: self.xid.clone(),
            });
        }
        self.set_status(state, Status::Prepared);

        trace!(xid = %self.xid, "Starting commit of two-phase commit");
        self.set_status(state, Status::Committing);
        let mut failed = 0;
        for participant in &state.participants {
            debug!(xid = %self.xid, "Calling xa_commit");
            if let Err(e) = participant.commit(&self.xid, false) {
                failed += 1;
                error!(xid = %self.xid, code = e.code, error = %e, "Participant failed commit");
            }
        }
        self.set_status(state, Status::Committed);
        debug!(xid = %self.xid, failed, "Commit of two-phase commit completed");

        self.check_pass(CompletionPhase::Commit, failed, state.participants.len())
    }

    fn rollback_participants(&self, state: &mut TransactionState) -> Result<()> {
        debug!(xid = %self.xid, participants = state.participants.len(), "Starting rollback");
        self.set_status(state, Status::RollingBack);

        let mut failed = 0;
        for participant in &state.participants {
            debug!(xid = %self.xid, "Calling xa_end(FAIL) and xa_rollback");
            let result = participant
                .end(&self.xid, EndFlag::Fail)
                .and_then(|_| participant.rollback(&self.xid));
            if let Err(e) = result {
                failed += 1;
                warn!(xid = %self.xid, code = e.code, error = %e, "Participant failed rollback");
            }
        }
        self.set_status(state, Status::RolledBack);
        debug!(xid = %self.xid, failed, "Rollback completed");

        self.check_pass(CompletionPhase::Rollback, failed, state.participants.len())
    }

    fn check_pass(&self, phase: CompletionPhase, failed: usize, attempted: usize) -> Result<()> {
        if failed == 0 {
            return Ok(());
        }
        self.possibly_inconsistent.store(true, Ordering::SeqCst);
        error!(
            xid = %self.xid,
            %phase,
            failed,
            attempted,
            "Transaction could not be completed on every participant. DATA MAY BE INCONSISTENT!"
        );
        Err(TransactionError::PartialOutcome {
            xid: self.xid.clone(),
            phase,
            failed,
            attempted,
        })
    }

    /* ***************************** */
    /* *** LISTENERS *************** */
    /* ***************************** */

    fn notify_before_completion(&self, listeners: &[Arc<dyn CompletionListener>]) {
        trace!(xid = %self.xid, listeners = listeners.len(), "before_completion()");
        for listener in listeners {
            if let Err(e) = listener.before_completion() {
                warn!(xid = %self.xid, error = %e, "Listener failed before completion; continuing");
            }
        }
    }

    fn notify_after_completion(&self, listeners: &[Arc<dyn CompletionListener>], status: Status) {
        trace!(xid = %self.xid, %status, listeners = listeners.len(), "after_completion()");
        for listener in listeners {
            if let Err(e) = listener.after_completion(status) {
                warn!(xid = %self.xid, error = %e, "Listener failed after completion; continuing");
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("xid", &self.xid)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
