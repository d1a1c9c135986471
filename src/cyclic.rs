//! The cyclic engine. One call to [`CyclicEngine::tick`] is one exchange: compose a
//! logical-read-write sub-command per domain plus whatever acyclic sub-commands the arbiter says
//! are ready, dispatch through the frame pool and device, collect the response, and publish
//! per-domain status.

use heapless::Vec;

use crate::acyclic::Arbiter;
use crate::device::Device;
use crate::domain::{Domain, DomainStatus};
use crate::error::Error;
use crate::pool::{FramePool, Phase, MAX_PAYLOAD};
use crate::wire::{self, Address, Opcode, SubcommandRequest};

/// Frame budget a tick may spend on sub-commands, leaving room for the header and the worst-case
/// zero-padding.
pub const MAX_TICK_PAYLOAD_BYTES: usize = 1470;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Ok,
    Partial,
    TimedOut,
    LinkDown,
}

pub struct CyclicEngine<const N: usize> {
    pool: FramePool<N>,
    buffers: [[u8; MAX_PAYLOAD]; N],
    /// Frame-pool slot ids submitted this tick for each domain, in domain order. A slot id is
    /// stable from `submit` through `take_terminal`, so no extra bookkeeping is needed to match
    /// it back up after `dispatch`.
    domain_slots: Vec<usize, N>,
    /// Frame-pool slot id paired with the acyclic request id it carries, for requests
    /// piggybacked this tick.
    acyclic_slots: Vec<(usize, u32), N>,
}

impl<const N: usize> CyclicEngine<N> {
    pub fn new(poll_budget: u32) -> Self {
        Self {
            pool: FramePool::new(poll_budget),
            buffers: core::array::from_fn(|_| [0u8; MAX_PAYLOAD]),
            domain_slots: Vec::new(),
            acyclic_slots: Vec::new(),
        }
    }

    /// Run one tick against `domains` (in the order their logical addresses were assigned) and
    /// `arbiter`, exchanging frames over `device`. `slave_ready[slave_index]` gates which
    /// application-issued acyclic requests the arbiter is allowed to piggyback this tick; see
    /// [`Arbiter::ready_transfers`].
    pub fn tick<D: Device>(
        &mut self,
        device: &mut D,
        domains: &mut [Domain],
        arbiter: &mut Arbiter,
        slave_ready: &[bool],
    ) -> Result<TickStatus, Error> {
        self.domain_slots.clear();
        self.acyclic_slots.clear();

        let mut budget = MAX_TICK_PAYLOAD_BYTES;

        for domain in domains.iter() {
            let payload_len = domain.image().len();
            if payload_len > budget {
                break;
            }
            let logical_start = domain.entries().first().map_or(0, |e| e.logical_start);
            let slot = self.pool.submit(
                Opcode::LogicalReadWrite,
                Address::Logical(logical_start),
                payload_len as u16,
                Some(domain.image()),
            )?;
            self.domain_slots
                .push(slot)
                .map_err(|_| Error::ResourceExhausted("frame pool too small for domain count"))?;
            budget = budget.saturating_sub(payload_len);
        }

        for piggyback in arbiter.ready_transfers(budget, slave_ready) {
            let slot = self.pool.submit(
                piggyback.opcode,
                piggyback.address,
                piggyback.payload_len,
                piggyback.outbound.as_deref(),
            )?;
            self.acyclic_slots
                .push((slot, piggyback.request_id))
                .map_err(|_| {
                    Error::ResourceExhausted("frame pool too small for piggybacked requests")
                })?;
            budget = budget.saturating_sub(usize::from(piggyback.payload_len));
        }

        let mut requests: Vec<SubcommandRequest<'_>, N> = Vec::new();
        let _ = self.pool.dispatch(&mut requests, &mut self.buffers);

        let mut tx_buf = [0u8; wire::MAX_FRAME_LEN];
        let encoded_len = wire::encode_frame(&mut tx_buf, &requests)?;

        let tx = device.prepare_tx(encoded_len)?;
        tx[..encoded_len].copy_from_slice(&tx_buf[..encoded_len]);
        device.transmit(encoded_len)?;

        device.poll().map_err(|_| Error::LinkDown)?;

        match device.received() {
            Some(frame) => match wire::decode_frame(frame) {
                Ok((_, decoded)) => {
                    for sub in decoded.iter() {
                        let _ = self.pool.on_received(sub);
                    }
                }
                Err(Error::ProtocolViolation(_)) => {
                    self.pool.record_protocol_violation();
                    self.pool.tick_timeouts();
                }
                Err(other) => return Err(other),
            },
            None => self.pool.tick_timeouts(),
        }

        let mut status = TickStatus::Ok;

        for (domain, &slot) in domains.iter_mut().zip(self.domain_slots.iter()) {
            match self.pool.take_terminal(slot) {
                Some((Phase::Received, wkc, payload)) => {
                    let len = domain.image().len();
                    domain.image_mut().copy_from_slice(&payload[..len]);
                    let expected = domain.entries().len().max(1) as u16;
                    let domain_status = DomainStatus::from_working_counter(wkc, expected);
                    if domain_status != DomainStatus::Complete {
                        status = TickStatus::Partial;
                    }
                    domain.set_status(domain_status);
                }
                Some((Phase::Timeout, _, _)) => {
                    domain.set_status(DomainStatus::Zero);
                    status = TickStatus::TimedOut;
                }
                _ => {
                    status = TickStatus::Partial;
                }
            }
        }

        for &(slot, request_id) in self.acyclic_slots.iter() {
            if let Some((phase, wkc, payload)) = self.pool.take_terminal(slot) {
                arbiter.on_transfer_complete(request_id, phase, wkc, &payload);
            }
        }

        Ok(status)
    }

    /// `(topology_changed, protocol_violation)` counts observed since startup.
    pub fn anomaly_counters(&self) -> (u64, u64) {
        (self.pool.topology_changed_count(), self.pool.protocol_violation_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackDevice;
    use crate::slave::SyncManagerDirection;
    use crate::domain::{DomainAllocator, DomainBuilder};

    #[test]
    fn tick_with_no_domains_and_no_acyclic_work_sends_an_empty_frame() {
        let mut engine: CyclicEngine<4> = CyclicEngine::new(4);
        let mut device = LoopbackDevice::new();
        let mut arbiter = Arbiter::new();

        let status = engine.tick(&mut device, &mut [], &mut arbiter, &[]).unwrap();
        assert_eq!(status, TickStatus::Ok);
    }

    #[test]
    fn tick_reflects_domain_into_logical_read_write_sub_command() {
        let mut allocator = DomainAllocator::new();
        let mut builder = DomainBuilder::new();
        builder.declare(0, 3, 4, SyncManagerDirection::MasterOut).unwrap();
        let domains = [builder.activate(&mut allocator).unwrap()];
        let mut domains = domains;

        let mut engine: CyclicEngine<4> = CyclicEngine::new(4);
        let mut device = LoopbackDevice::new();
        let mut arbiter = Arbiter::new();

        // No real slave is listening on the loopback, so the logical-read-write sub-command
        // times out; this only exercises that a tick completes and reports the timeout rather
        // than panicking.
        let status = engine.tick(&mut device, &mut domains, &mut arbiter, &[]).unwrap();
        assert_eq!(status, TickStatus::Partial);
    }
}
