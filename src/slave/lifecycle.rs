//! The per-slave lifecycle state machine: `unknown -> init -> preop -> safeop -> op`, plus an
//! `acknowledge` transition that recovers from an error back to `init`. Driven one step per tick
//! from [`super::Slave::current_state`]/`target_state`; never called from application code
//! directly.

use fieldring_wire::{WireRead, WireWriteSized};

/// The register layout a slave exposes its current/target lifecycle state through — a 16-bit
/// control/status word: 4-bit state, 1-bit error flag, 1-bit acknowledge-request flag, with 10
/// reserved bits after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, fieldring_wire::Wire)]
#[wire(bits = 16)]
pub struct ControlStatusWord {
    #[wire(bits = 4)]
    pub state: LifecycleState,
    #[wire(bits = 1)]
    pub error: bool,
    #[wire(bits = 1, post_skip = 10)]
    pub acknowledge_request: bool,
}

/// A slave's position in the lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, fieldring_wire::Wire)]
#[repr(u8)]
pub enum LifecycleState {
    #[default]
    Unknown = 0,
    Init = 1,
    PreOp = 2,
    SafeOp = 4,
    Op = 8,
}

impl LifecycleState {
    /// The next state on the way to `target`, one step at a time; `None` once `self` already
    /// matches `target` or exceeds it.
    fn next_toward(self, target: LifecycleState) -> Option<LifecycleState> {
        use LifecycleState::*;

        if self as u8 >= target as u8 {
            return None;
        }

        match self {
            Unknown => Some(Init),
            Init => Some(PreOp),
            PreOp => Some(SafeOp),
            SafeOp => Some(Op),
            Op => None,
        }
    }
}

/// A single step's outcome: the configuration work the driving engine must perform before it may
/// advance the slave to the returned state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No transition is due; the slave already matches its target, or is waiting on a pending
    /// request.
    Idle,
    /// Run the destination state's configuration sequence before requesting the transition:
    /// sync-manager/memory-mapper pages for `safeop`, the parameter-object sub-FSM for `preop`.
    Configure(LifecycleState),
    /// Request the transition directly; no additional configuration is required for it.
    Request(LifecycleState),
    /// The slave reported `error`; acknowledge it and fall back to `init`.
    Acknowledge,
}

/// Up to this many consecutive refusals of the same requested transition are tolerated, 10
/// microseconds apart, before the engine gives up on the slave.
pub const MAX_TRANSITION_RETRIES: u32 = 100;
pub const TRANSITION_RETRY_INTERVAL_US: u64 = 10;

/// Drives one cooperative step of the FSM given the slave's last-observed control/status word
/// and its configured target. Pure: callers apply the returned [`Step`] and feed the resulting
/// observation back in on the next tick.
pub fn step(observed: ControlStatusWord, target: LifecycleState) -> Step {
    if observed.error {
        return Step::Acknowledge;
    }

    match observed.state.next_toward(target) {
        None => Step::Idle,
        Some(SafeOp) => Step::Configure(LifecycleState::SafeOp),
        Some(PreOp) => Step::Configure(LifecycleState::PreOp),
        Some(next) => Step::Request(next),
    }
}

/// One register transfer's identity in the acyclic arbiter, as returned by
/// [`crate::acyclic::Arbiter::enqueue`].
pub type RequestId = u32;

/// Which page-write the engine is on while configuring `safeop`, before it requests the
/// transition itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeOpStage {
    SyncManager(usize),
    Mapper(usize),
}

/// How many sync managers a single `preop` configuration pass will walk in one slave's lifetime;
/// bounds the queue of sync-manager indices still waiting to be examined.
pub const MAX_CONFIGURABLE_SYNC_MANAGERS: usize = 16;

/// Which half of the parameter-object sub-FSM is currently running for a sync manager: first the
/// read-back, then — only if it [`super::parameter_object::differs`] from what's declared — the
/// write pass.
#[derive(Debug, Clone)]
pub enum PreOpPhase {
    Reading(super::parameter_object::ReadPass),
    Configuring(super::parameter_object::ConfigurePass),
}

/// In-flight lifecycle work the driving engine resumes on the next tick. Never constructed or
/// matched on outside [`crate::master`].
#[derive(Debug, Clone)]
pub enum InFlight {
    /// Waiting on the node-write of the target state into the control register.
    WriteControl {
        request: RequestId,
        target: LifecycleState,
        retries_left: u32,
    },
    /// Waiting on a read of the status register to confirm the slave reached `target`.
    PollStatus {
        request: RequestId,
        target: LifecycleState,
        retries_left: u32,
    },
    /// Writing one sync-manager or memory-mapper configuration page before requesting `safeop`.
    WriteSafeOpPage {
        request: RequestId,
        stage: SafeOpStage,
        retries_left: u32,
    },
    /// Driving the parameter-object sub-FSM for one sync manager before requesting `preop`.
    /// `remaining` holds the sync-manager indices still to be examined after this one.
    ConfigurePreOp {
        request: RequestId,
        sync_manager_index: u8,
        remaining: heapless::Vec<u8, MAX_CONFIGURABLE_SYNC_MANAGERS>,
        phase: PreOpPhase,
    },
    /// Waiting on the node-write that acknowledges a reported error.
    WriteAcknowledge { request: RequestId, retries_left: u32 },
}

/// Per-slave bookkeeping for the lifecycle-transition request currently in flight, carried
/// across ticks. Opaque outside [`crate::master`]; application code never constructs one.
#[derive(Debug, Clone, Default)]
pub struct TransitionSlot {
    pub(crate) inner: Option<InFlight>,
}

impl TransitionSlot {
    pub(crate) fn is_idle(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_unknown_to_op_one_state_at_a_time() {
        let target = LifecycleState::Op;

        let mut observed = ControlStatusWord {
            state: LifecycleState::Unknown,
            error: false,
            acknowledge_request: false,
        };

        let expect_request = |state: LifecycleState| match step(observed, target) {
            Step::Request(s) => assert_eq!(s, state),
            Step::Configure(s) => assert_eq!(s, state),
            other => panic!("unexpected step {other:?}"),
        };

        expect_request(LifecycleState::Init);
        observed.state = LifecycleState::Init;

        expect_request(LifecycleState::PreOp);
        observed.state = LifecycleState::PreOp;

        expect_request(LifecycleState::SafeOp);
        observed.state = LifecycleState::SafeOp;

        expect_request(LifecycleState::Op);
        observed.state = LifecycleState::Op;

        assert_eq!(step(observed, target), Step::Idle);
    }

    #[test]
    fn error_flag_requests_acknowledge_regardless_of_target() {
        let observed = ControlStatusWord {
            state: LifecycleState::SafeOp,
            error: true,
            acknowledge_request: false,
        };

        assert_eq!(step(observed, LifecycleState::Op), Step::Acknowledge);
    }

    #[test]
    fn control_status_word_packs_state_and_error_bits() {
        let value = ControlStatusWord {
            state: LifecycleState::SafeOp,
            error: true,
            acknowledge_request: false,
        };

        assert_eq!(value.pack(), [0x04 | 0x10, 0x00]);
    }
}
