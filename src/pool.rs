//! Frame pool & dispatcher.
//!
//! Owns a bounded set of frame descriptors, assigns each a monotonic 8-bit command index at the
//! moment it is handed to the wire, and matches received sub-commands back to the descriptor
//! that sent them.

use heapless::Vec;

use crate::error::Error;
use crate::wire::{Address, DecodedSubcommand, Opcode, SubcommandRequest};

/// Largest payload a single descriptor can carry. Bounds one logical-read-write domain payload
/// or one acyclic service-channel chunk; well under the 1500-byte frame ceiling so several
/// descriptors still fit in one frame.
pub const MAX_PAYLOAD: usize = 1024;

/// Where a descriptor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Free, available to [`FramePool::submit`].
    Ready,
    /// Configured with a sub-command, waiting for the next dispatch pass.
    Queued,
    /// Handed to the wire; `index` is stable until a terminal phase is reached.
    Sent,
    /// A matching response was received; `working_counter` and the payload are current.
    Received,
    /// No response arrived within the dispatcher's poll budget.
    Timeout,
    /// The sub-command was dropped due to a protocol violation or topology anomaly.
    Error,
}

/// One in-flight (or idle) command.
pub struct Descriptor {
    pub opcode: Opcode,
    pub address: Address,
    pub payload: Vec<u8, MAX_PAYLOAD>,
    pub phase: Phase,
    pub index: u8,
    pub working_counter: u16,
    ticks_in_flight: u32,
}

impl Descriptor {
    fn idle() -> Self {
        Self {
            opcode: Opcode::Nop,
            address: Address::Logical(0),
            payload: Vec::new(),
            phase: Phase::Ready,
            index: 0,
            working_counter: 0,
            ticks_in_flight: 0,
        }
    }
}

/// A bounded pool of `N` frame descriptors plus the index assigned to each in-flight one.
pub struct FramePool<const N: usize> {
    slots: [Descriptor; N],
    /// `index_owner[i]` is the slot holding command index `i`, if any slot is currently `Sent`
    /// under that index.
    index_owner: [Option<usize>; 256],
    next_index: u8,
    /// How many dispatcher polls a `Sent` descriptor may wait before it's marked `Timeout`.
    poll_budget: u32,
    topology_changed: u64,
    protocol_violations: u64,
}

impl<const N: usize> FramePool<N> {
    pub fn new(poll_budget: u32) -> Self {
        Self {
            slots: core::array::from_fn(|_| Descriptor::idle()),
            index_owner: [None; 256],
            next_index: 0,
            poll_budget,
            topology_changed: 0,
            protocol_violations: 0,
        }
    }

    /// Count of received frames whose index didn't match any in-flight descriptor, since startup.
    pub fn topology_changed_count(&self) -> u64 {
        self.topology_changed
    }

    /// Count of structurally invalid received frames, since startup.
    pub fn protocol_violation_count(&self) -> u64 {
        self.protocol_violations
    }

    /// Record a frame rejected before it could be matched against any descriptor (e.g. a
    /// malformed header or sub-command).
    pub fn record_protocol_violation(&mut self) {
        self.protocol_violations += 1;
    }

    /// Reserve a free slot and fill it with a pending sub-command. Returns the slot id used to
    /// refer to it until it reaches a terminal phase.
    pub fn submit(
        &mut self,
        opcode: Opcode,
        address: Address,
        payload_len: u16,
        outbound: Option<&[u8]>,
    ) -> Result<usize, Error> {
        let slot_id = self
            .slots
            .iter()
            .position(|d| d.phase == Phase::Ready)
            .ok_or(Error::ResourceExhausted("frame pool exhausted"))?;

        let slot = &mut self.slots[slot_id];
        slot.opcode = opcode;
        slot.address = address;
        slot.payload.clear();

        match outbound {
            Some(data) => slot
                .payload
                .extend_from_slice(data)
                .map_err(|_| Error::ResourceExhausted("descriptor payload capacity exceeded"))?,
            None => slot
                .payload
                .resize(usize::from(payload_len), 0)
                .map_err(|_| Error::ResourceExhausted("descriptor payload capacity exceeded"))?,
        }

        slot.phase = Phase::Queued;
        slot.ticks_in_flight = 0;

        Ok(slot_id)
    }

    /// Move every `Queued` descriptor to `Sent`, assigning it the next monotonic index, and
    /// build the wire request for it. Returns the slot ids in the same order as `out`.
    pub fn dispatch<'buf>(
        &mut self,
        out: &mut Vec<SubcommandRequest<'buf>, N>,
        buffers: &'buf mut [[u8; MAX_PAYLOAD]; N],
    ) -> Vec<usize, N> {
        let mut dispatched: Vec<(usize, Opcode, Address, usize), N> = Vec::new();

        // First pass: assign indices and stage each descriptor's payload into its scratch
        // buffer. Kept separate from building `out` below so every `&buffers[slot_id]` borrow
        // handed out afterwards is immutable and none of them alias a later write.
        for (slot_id, slot) in self.slots.iter_mut().enumerate() {
            if slot.phase != Phase::Queued {
                continue;
            }

            let index = self.next_index;
            self.next_index = self.next_index.wrapping_add(1);

            slot.index = index;
            slot.phase = Phase::Sent;
            slot.ticks_in_flight = 0;
            self.index_owner[usize::from(index)] = Some(slot_id);

            let payload_len = slot.payload.len();
            buffers[slot_id][..payload_len].copy_from_slice(&slot.payload);

            // Pool capacity is exactly `N`, matching `dispatched`'s capacity.
            let _ = dispatched.push((slot_id, slot.opcode, slot.address, payload_len));
        }

        // Every write above is done; downgrade to a shared borrow so each request's payload
        // slice can share `'buf` instead of being tied to this function's body.
        let buffers: &[[u8; MAX_PAYLOAD]; N] = buffers;

        let mut slot_ids = Vec::new();

        for (slot_id, opcode, address, payload_len) in dispatched {
            let index = self.slots[slot_id].index;

            let request = SubcommandRequest {
                opcode,
                index,
                address,
                payload_len: payload_len as u16,
                outbound_payload: if opcode.carries_outbound_payload() {
                    Some(&buffers[slot_id][..payload_len])
                } else {
                    None
                },
            };

            let _ = out.push(request);
            let _ = slot_ids.push(slot_id);
        }

        slot_ids
    }

    /// Resolve a received sub-command against its dispatched descriptor.
    pub fn on_received(&mut self, decoded: &DecodedSubcommand<'_>) -> Result<(), Error> {
        let Some(slot_id) = self.index_owner[usize::from(decoded.index)] else {
            // No descriptor is currently waiting on this index: a stale or foreign frame.
            self.topology_changed += 1;
            return Err(Error::TopologyChanged {
                expected: 0,
                got: decoded.index,
            });
        };

        let slot = &mut self.slots[slot_id];

        if slot.phase != Phase::Sent || slot.opcode != decoded.opcode {
            self.topology_changed += 1;
            return Err(Error::TopologyChanged {
                expected: slot.index,
                got: decoded.index,
            });
        }

        slot.payload.clear();
        let _ = slot.payload.extend_from_slice(decoded.payload);
        slot.working_counter = decoded.working_counter;
        slot.phase = Phase::Received;
        self.index_owner[usize::from(decoded.index)] = None;

        Ok(())
    }

    /// Advance every `Sent` descriptor's poll counter by one tick, marking any that have run out
    /// of budget `Timeout`. Call once per dispatcher poll.
    pub fn tick_timeouts(&mut self) {
        for (slot_id, slot) in self.slots.iter_mut().enumerate() {
            if slot.phase != Phase::Sent {
                continue;
            }

            slot.ticks_in_flight += 1;

            if slot.ticks_in_flight > self.poll_budget {
                slot.phase = Phase::Timeout;
                self.index_owner[usize::from(slot.index)] = None;
            }
        }
    }

    /// Return (and free) a descriptor that has reached a terminal phase.
    pub fn take_terminal(&mut self, slot_id: usize) -> Option<(Phase, u16, Vec<u8, MAX_PAYLOAD>)> {
        let slot = &mut self.slots[slot_id];

        if !matches!(slot.phase, Phase::Received | Phase::Timeout | Phase::Error) {
            return None;
        }

        let phase = slot.phase;
        let wkc = slot.working_counter;
        let payload = core::mem::replace(&mut slot.payload, Vec::new());

        *slot = Descriptor::idle();

        Some((phase, wkc, payload))
    }

    pub fn phase_of(&self, slot_id: usize) -> Phase {
        self.slots[slot_id].phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_then_timeout() {
        let mut pool: FramePool<4> = FramePool::new(2);
        let slot = pool
            .submit(Opcode::BroadcastRead, Address::Broadcast { offset: 0 }, 2, None)
            .unwrap();

        assert_eq!(pool.phase_of(slot), Phase::Queued);

        let mut buffers = core::array::from_fn(|_| [0u8; MAX_PAYLOAD]);
        let mut out = Vec::new();
        pool.dispatch(&mut out, &mut buffers);

        assert_eq!(pool.phase_of(slot), Phase::Sent);

        pool.tick_timeouts();
        assert_eq!(pool.phase_of(slot), Phase::Sent);
        pool.tick_timeouts();
        pool.tick_timeouts();
        assert_eq!(pool.phase_of(slot), Phase::Timeout);

        let (phase, _, _) = pool.take_terminal(slot).unwrap();
        assert_eq!(phase, Phase::Timeout);
        assert_eq!(pool.phase_of(slot), Phase::Ready);
    }
}
