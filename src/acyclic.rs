//! The acyclic arbiter. Owns the queue of pending parameter-object / register / file /
//! service-channel requests and, each tick, offers the cyclic engine a bounded batch of
//! sub-commands to piggyback onto the cyclic frame.

use heapless::Vec;

use crate::pool::Phase;
use crate::wire::{Address, Opcode};

pub const MAX_PENDING_REQUESTS: usize = 64;

/// What kind of acyclic transfer a request represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    ParameterRead,
    ParameterWrite,
    RegisterRead,
    RegisterWrite,
    FileRead,
    FileWrite,
    ServiceChannelRead,
    ServiceChannelWrite,
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Init,
    Queued,
    Busy,
    Success,
    Failed,
}

/// A pending acyclic transfer.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u32,
    pub slave_index: usize,
    pub kind: RequestKind,
    pub address: Address,
    pub payload: heapless::Vec<u8, 256>,
    pub phase: RequestPhase,
    pub abort_code: Option<u32>,
    /// `true` for requests the lifecycle-driving engine issues against a slave on its way to
    /// `preop` (register writes/reads, parameter-object assignment); these bypass the
    /// not-yet-`preop` queueing rule in [`Arbiter::ready_transfers`] since they are what gets
    /// the slave to `preop` in the first place. `false` for every request an application issues
    /// through [`crate::master::Master`]'s public `issue_*` methods.
    pub internal: bool,
}

/// One sub-command the cyclic engine should dispatch on the arbiter's behalf this tick.
#[derive(Debug, Clone)]
pub struct PiggybackTransfer {
    pub request_id: u32,
    pub opcode: Opcode,
    pub address: Address,
    pub payload_len: u16,
    pub outbound: Option<heapless::Vec<u8, 256>>,
}

/// Per-slave, at most one outstanding request; FIFO within a slave, round-robin across slaves.
pub struct Arbiter {
    queue: Vec<Request, MAX_PENDING_REQUESTS>,
    next_id: u32,
    /// Ring-position of the slave to consider next when picking the next request to dispatch.
    round_robin_cursor: usize,
}

impl Arbiter {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            next_id: 0,
            round_robin_cursor: 0,
        }
    }

    pub fn enqueue(
        &mut self,
        slave_index: usize,
        kind: RequestKind,
        address: Address,
        payload: heapless::Vec<u8, 256>,
    ) -> Option<u32> {
        self.enqueue_with(slave_index, kind, address, payload, false)
    }

    /// Enqueue a request issued by the lifecycle-driving engine itself rather than an
    /// application; see [`Request::internal`].
    pub(crate) fn enqueue_internal(
        &mut self,
        slave_index: usize,
        kind: RequestKind,
        address: Address,
        payload: heapless::Vec<u8, 256>,
    ) -> Option<u32> {
        self.enqueue_with(slave_index, kind, address, payload, true)
    }

    fn enqueue_with(
        &mut self,
        slave_index: usize,
        kind: RequestKind,
        address: Address,
        payload: heapless::Vec<u8, 256>,
        internal: bool,
    ) -> Option<u32> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.queue
            .push(Request {
                id,
                slave_index,
                kind,
                address,
                payload,
                phase: RequestPhase::Queued,
                abort_code: None,
                internal,
            })
            .ok()?;

        Some(id)
    }

    pub fn phase_of(&self, id: u32) -> Option<RequestPhase> {
        self.queue.iter().find(|r| r.id == id).map(|r| r.phase)
    }

    /// Payload of a completed request, available until the request is drained.
    pub fn payload_of(&self, id: u32) -> Option<&[u8]> {
        self.queue.iter().find(|r| r.id == id).map(|r| r.payload.as_slice())
    }

    /// Cancel a queued request; a `busy` request is not removed.
    pub fn cancel(&mut self, id: u32) -> bool {
        if let Some(pos) = self
            .queue
            .iter()
            .position(|r| r.id == id && r.phase == RequestPhase::Queued)
        {
            self.queue.remove(pos);
            true
        } else {
            false
        }
    }

    /// Drop a request by id regardless of phase. For the lifecycle-driving engine's own internal
    /// requests, whose id never reaches application code as a [`crate::master::RequestHandle`]
    /// and so can't be cancelled or drained through the public surface.
    pub(crate) fn remove(&mut self, id: u32) {
        if let Some(pos) = self.queue.iter().position(|r| r.id == id) {
            self.queue.remove(pos);
        }
    }

    /// Select up to one request per distinct slave, round-robin, whose combined payload fits
    /// `budget` bytes, and mark them `busy`. `slave_ready[slave_index]` gates application-issued
    /// requests only — a slave not yet past `preop` queues its requests until it gets there; a
    /// request the lifecycle engine issues against that same slave to drive it toward `preop` in
    /// the first place (`internal: true`) is exempt, or the slave could never progress at all.
    pub fn ready_transfers(
        &mut self,
        budget: usize,
        slave_ready: &[bool],
    ) -> Vec<PiggybackTransfer, MAX_PENDING_REQUESTS> {
        let mut out = Vec::new();
        let mut remaining = budget;
        let mut dispatched_slaves: Vec<usize, MAX_PENDING_REQUESTS> = Vec::new();

        if self.queue.is_empty() {
            return out;
        }

        let len = self.queue.len();
        for offset in 0..len {
            let idx = (self.round_robin_cursor + offset) % len;
            let Some(request) = self.queue.get_mut(idx) else { continue };

            let slave_not_ready = !request.internal
                && !slave_ready.get(request.slave_index).copied().unwrap_or(false);

            if request.phase != RequestPhase::Queued
                || dispatched_slaves.contains(&request.slave_index)
                || slave_not_ready
            {
                continue;
            }

            let payload_len = request.payload.len();
            if payload_len > remaining {
                continue;
            }

            let outbound = matches!(
                request.kind,
                RequestKind::ParameterWrite
                    | RequestKind::RegisterWrite
                    | RequestKind::FileWrite
                    | RequestKind::ServiceChannelWrite
            )
            .then(|| request.payload.clone());

            if out
                .push(PiggybackTransfer {
                    request_id: request.id,
                    opcode: opcode_for_kind(request.kind),
                    address: request.address,
                    payload_len: payload_len as u16,
                    outbound,
                })
                .is_err()
            {
                break;
            }

            request.phase = RequestPhase::Busy;
            let _ = dispatched_slaves.push(request.slave_index);
        }

        self.round_robin_cursor = (self.round_robin_cursor + 1) % len.max(1);
        out
    }

    /// Feed back the result of a dispatched transfer.
    pub fn on_transfer_complete(&mut self, request_id: u32, phase: Phase, _wkc: u16, payload: &[u8]) {
        let Some(request) = self.queue.iter_mut().find(|r| r.id == request_id) else {
            return;
        };

        match phase {
            Phase::Received => {
                request.payload.clear();
                let _ = request.payload.extend_from_slice(payload);
                request.phase = RequestPhase::Success;
            }
            _ => {
                request.phase = RequestPhase::Failed;
                request.abort_code = Some(1);
            }
        }
    }

    /// Drop every request that has reached a terminal phase, returning their ids.
    pub fn drain_terminal(&mut self) -> Vec<u32, MAX_PENDING_REQUESTS> {
        let mut done = Vec::new();
        self.queue.retain(|r| {
            let terminal = matches!(r.phase, RequestPhase::Success | RequestPhase::Failed);
            if terminal {
                let _ = done.push(r.id);
            }
            !terminal
        });
        done
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

fn opcode_for_kind(kind: RequestKind) -> Opcode {
    match kind {
        RequestKind::ParameterRead
        | RequestKind::RegisterRead
        | RequestKind::FileRead
        | RequestKind::ServiceChannelRead => Opcode::NodeRead,
        RequestKind::ParameterWrite
        | RequestKind::RegisterWrite
        | RequestKind::FileWrite
        | RequestKind::ServiceChannelWrite => Opcode::NodeWrite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_request_can_be_cancelled() {
        let mut arbiter = Arbiter::new();
        let id = arbiter
            .enqueue(
                0,
                RequestKind::RegisterRead,
                Address::Physical { node: 1, offset: 0 },
                heapless::Vec::new(),
            )
            .unwrap();

        assert!(arbiter.cancel(id));
        assert_eq!(arbiter.phase_of(id), None);
    }

    #[test]
    fn busy_request_is_not_cancelled() {
        let mut arbiter = Arbiter::new();
        let id = arbiter
            .enqueue(
                0,
                RequestKind::RegisterRead,
                Address::Physical { node: 1, offset: 0 },
                heapless::Vec::new(),
            )
            .unwrap();

        let _ = arbiter.ready_transfers(1024, &[true]);
        assert_eq!(arbiter.phase_of(id), Some(RequestPhase::Busy));
        assert!(!arbiter.cancel(id));
    }

    #[test]
    fn at_most_one_outstanding_request_per_slave() {
        let mut arbiter = Arbiter::new();
        let _ = arbiter.enqueue(0, RequestKind::RegisterRead, Address::Physical { node: 1, offset: 0 }, heapless::Vec::new());
        let _ = arbiter.enqueue(0, RequestKind::RegisterRead, Address::Physical { node: 1, offset: 2 }, heapless::Vec::new());

        let ready = arbiter.ready_transfers(1024, &[true]);
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn requests_to_a_slave_not_yet_past_preop_stay_queued() {
        let mut arbiter = Arbiter::new();
        let id = arbiter
            .enqueue(
                0,
                RequestKind::RegisterRead,
                Address::Physical { node: 1, offset: 0 },
                heapless::Vec::new(),
            )
            .unwrap();

        let ready = arbiter.ready_transfers(1024, &[false]);
        assert!(ready.is_empty());
        assert_eq!(arbiter.phase_of(id), Some(RequestPhase::Queued));

        let ready = arbiter.ready_transfers(1024, &[true]);
        assert_eq!(ready.len(), 1);
        assert_eq!(arbiter.phase_of(id), Some(RequestPhase::Busy));
    }

    #[test]
    fn internal_requests_bypass_the_not_yet_preop_gate() {
        let mut arbiter = Arbiter::new();
        let id = arbiter
            .enqueue_internal(
                0,
                RequestKind::RegisterWrite,
                Address::Physical { node: 1, offset: 0x0120 },
                heapless::Vec::new(),
            )
            .unwrap();

        let ready = arbiter.ready_transfers(1024, &[false]);
        assert_eq!(ready.len(), 1);
        assert_eq!(arbiter.phase_of(id), Some(RequestPhase::Busy));
    }
}
