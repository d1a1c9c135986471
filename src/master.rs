//! The application façade. The realtime application's entire surface: acquire a master, register
//! slaves, declare domain mappings, activate, tick, and issue acyclic requests.

use heapless::Vec;

use fieldring_wire::{WireRead, WireWriteSized};

use crate::acyclic::{Arbiter, RequestKind, RequestPhase};
use crate::config::MasterConfig;
use crate::cyclic::{CyclicEngine, TickStatus};
use crate::device::Device;
use crate::domain::{Domain, DomainAllocator, DomainBuilder};
use crate::error::Error;
use crate::fmt::log_at;
use crate::slave::lifecycle::{
    self, ControlStatusWord, InFlight, LifecycleState, PreOpPhase, SafeOpStage, Step,
};
use crate::slave::parameter_object::{ConfigurePass, Outcome, ReadPass, Transfer, differs};
use crate::slave::{Capabilities, Identity, MapperEntry, Slave, SyncManager};
use crate::wire::Address;

pub const MAX_MASTERS: usize = 4;
pub const MAX_SLAVES: usize = 128;
pub const MAX_DOMAINS: usize = 16;

/// Control/status word register, polled/written while driving a slave's lifecycle transitions.
const CONTROL_REGISTER_OFFSET: u16 = 0x0120;
const STATUS_REGISTER_OFFSET: u16 = 0x0130;

/// Sync-manager configuration pages, one 8-byte page per sync manager, written while configuring
/// `safeop`: physical_start (u16 LE), length (u16 LE), direction (u8), enabled (u8), 2 reserved.
const SYNC_MANAGER_PAGE_BASE: u16 = 0x0600;
const SYNC_MANAGER_PAGE_LEN: u16 = 8;

/// Memory-mapper configuration pages, one 16-byte page per mapper entry, written while
/// configuring `safeop`: logical_start_bit (u32 LE), length_bits (u16 LE), physical_start_bit
/// (u16 LE), sync_manager_index (u8), 7 reserved.
const MAPPER_PAGE_BASE: u16 = 0x0800;
const MAPPER_PAGE_LEN: u16 = 16;

fn encode_sync_manager_page(sm: &SyncManager) -> heapless::Vec<u8, 256> {
    let mut page: heapless::Vec<u8, 256> = heapless::Vec::new();
    let _ = page.extend_from_slice(&sm.physical_start.to_le_bytes());
    let _ = page.extend_from_slice(&sm.length.to_le_bytes());
    let _ = page.push(match sm.direction {
        crate::slave::SyncManagerDirection::MasterOut => 0,
        crate::slave::SyncManagerDirection::MasterIn => 1,
    });
    let _ = page.push(sm.enabled as u8);
    let _ = page.extend_from_slice(&[0u8, 0u8]);
    page
}

fn encode_mapper_page(entry: &MapperEntry) -> heapless::Vec<u8, 256> {
    let mut page: heapless::Vec<u8, 256> = heapless::Vec::new();
    let _ = page.extend_from_slice(&entry.logical_start_bit.to_le_bytes());
    let _ = page.extend_from_slice(&entry.length_bits.to_le_bytes());
    let _ = page.extend_from_slice(&entry.physical_start_bit.to_le_bytes());
    let _ = page.push(entry.sync_manager_index);
    let _ = page.extend_from_slice(&[0u8; 7]);
    page
}

/// An exclusive lease on one master instance, returned by [`MasterRegistry::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterHandle {
    index: usize,
}

/// Tracks which of up to `M` master instances are currently leased: exclusive per index,
/// subsequent requests return busy until released.
pub struct MasterRegistry<const M: usize = MAX_MASTERS> {
    busy: [bool; M],
}

impl<const M: usize> MasterRegistry<M> {
    pub fn new() -> Self {
        Self { busy: [false; M] }
    }

    pub fn request(&mut self, index: usize) -> Result<MasterHandle, Error> {
        let slot = self
            .busy
            .get_mut(index)
            .ok_or(Error::InvalidArgument("master index out of range"))?;

        if *slot {
            return Err(Error::ResourceExhausted("master already in use"));
        }

        *slot = true;
        Ok(MasterHandle { index })
    }

    pub fn release(&mut self, handle: MasterHandle) {
        if let Some(slot) = self.busy.get_mut(handle.index) {
            *slot = false;
        }
    }
}

impl<const M: usize> Default for MasterRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference to a registered slave, stable for the master's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveRef(usize);

/// One entry of a batch [`Master::register_slave_list`] call.
pub struct SlaveSpec {
    pub bus_index: usize,
    pub vendor_id: u32,
    pub product_code: u32,
    pub domain_index: usize,
    pub sync_manager_index: u8,
    pub io_length: u32,
    pub direction: crate::slave::SyncManagerDirection,
}

/// Phase of request handled by an acyclic issuer.
pub struct RequestHandle(pub u32);

/// Running counts of anomaly events observed since the master was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnomalyCounters {
    pub protocol_violation: u64,
    pub topology_changed: u64,
}

/// One master instance: its slave table, domains, cyclic engine, and acyclic arbiter.
pub struct Master<const N: usize> {
    config: MasterConfig,
    slaves: Vec<Slave, MAX_SLAVES>,
    domain_builders: Vec<Option<DomainBuilder>, MAX_DOMAINS>,
    domains: Vec<Domain, MAX_DOMAINS>,
    allocator: DomainAllocator,
    engine: CyclicEngine<N>,
    arbiter: Arbiter,
    debug_level: log::LevelFilter,
    active: bool,
}

impl<const N: usize> Master<N> {
    pub fn new(config: MasterConfig) -> Self {
        let mut domain_builders = Vec::new();
        for _ in 0..MAX_DOMAINS {
            let _ = domain_builders.push(Some(DomainBuilder::new()));
        }

        let poll_budget = config.poll_budget;
        Self {
            config,
            slaves: Vec::new(),
            domain_builders,
            domains: Vec::new(),
            allocator: DomainAllocator::new(),
            engine: CyclicEngine::new(poll_budget),
            arbiter: Arbiter::new(),
            debug_level: log::LevelFilter::Off,
            active: false,
        }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn slaves(&self) -> &[Slave] {
        &self.slaves
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Register a slave discovered at `bus_index`, checking it matches the expected identity.
    pub fn register_slave(
        &mut self,
        bus_index: usize,
        vendor_id: u32,
        product_code: u32,
        identity: Identity,
    ) -> Result<SlaveRef, Error> {
        if identity.vendor_id != vendor_id || identity.product_code != product_code {
            return Err(Error::ConfigurationRejected);
        }

        let slave_index = self.slaves.len();
        self.slaves
            .push(Slave::new(identity, bus_index as u16))
            .map_err(|_| Error::ResourceExhausted("slave table full"))?;

        Ok(SlaveRef(slave_index))
    }

    /// Record a slave's mailbox-CoE/parameter-object-configuration capability bits. No wire-level
    /// discovery of these bits exists yet; the caller supplies them (e.g. from a device
    /// description) after [`Master::register_slave`].
    pub fn set_slave_capabilities(&mut self, slave: SlaveRef, capabilities: Capabilities) {
        if let Some(s) = self.slaves.get_mut(slave.0) {
            s.capabilities = capabilities;
        }
    }

    /// Batch form of [`Master::register_slave`]; returns how many of `specs` succeeded.
    pub fn register_slave_list(&mut self, specs: &[(usize, Identity)]) -> usize {
        let mut count = 0;
        for &(bus_index, identity) in specs {
            if self
                .register_slave(bus_index, identity.vendor_id, identity.product_code, identity)
                .is_ok()
            {
                count += 1;
            }
        }
        count
    }

    /// Declare that `slave`'s sync manager should be mapped into `domain_index`'s image.
    pub fn declare_mapping(
        &mut self,
        slave: SlaveRef,
        domain_index: usize,
        sync_manager_index: u8,
        length: u32,
        direction: crate::slave::SyncManagerDirection,
    ) -> Result<(), Error> {
        let builder = self
            .domain_builders
            .get_mut(domain_index)
            .and_then(|b| b.as_mut())
            .ok_or(Error::InvalidArgument("no such domain index"))?;

        builder.declare(slave.0, sync_manager_index, length, direction)
    }

    /// Freeze every domain's mapping and begin driving every slave's lifecycle FSM toward `op`.
    pub fn activate(&mut self) -> Result<(), Error> {
        for slot in self.domain_builders.iter_mut() {
            let Some(builder) = slot.take() else { continue };
            let domain = builder.activate(&mut self.allocator)?;
            self.domains
                .push(domain)
                .map_err(|_| Error::ResourceExhausted("domain table full"))?;
        }

        for slave in self.slaves.iter_mut() {
            slave.target_state = LifecycleState::Op;
        }

        self.active = true;
        Ok(())
    }

    /// Drive every slave back to `init` and stop cyclic exchanges.
    pub fn deactivate(&mut self) {
        for slave in self.slaves.iter_mut() {
            slave.target_state = LifecycleState::Init;
        }
        self.active = false;
    }

    /// Set this master's own verbosity override, independent of the process-wide log level:
    /// `0` = off, `1` = warn, `2` = info, `3` = debug.
    pub fn set_debug_level(&mut self, level: u8) -> Result<(), Error> {
        self.debug_level = match level {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => return Err(Error::InvalidArgument("debug level must be 0..=3")),
        };
        Ok(())
    }

    /// One tick: step every slave's lifecycle FSM by one request each, then, if active, run one
    /// cyclic exchange.
    pub fn tick<D: Device>(&mut self, device: &mut D) -> Result<TickStatus, Error> {
        for slave_index in 0..self.slaves.len() {
            self.step_lifecycle(slave_index);
        }

        if !self.active {
            return Ok(TickStatus::Ok);
        }

        let mut slave_ready: heapless::Vec<bool, MAX_SLAVES> = heapless::Vec::new();
        for slave in self.slaves.iter() {
            let _ = slave_ready.push(slave.current_state as u8 >= LifecycleState::PreOp as u8);
        }

        let status = self
            .engine
            .tick(device, &mut self.domains, &mut self.arbiter, &slave_ready)?;
        log_at!(self.debug_level, log::Level::Debug, "tick completed: {status:?}");
        Ok(status)
    }

    fn issue(
        &mut self,
        slave: SlaveRef,
        kind: RequestKind,
        address: Address,
        payload: heapless::Vec<u8, 256>,
    ) -> Result<RequestHandle, Error> {
        let id = self
            .arbiter
            .enqueue(slave.0, kind, address, payload)
            .ok_or(Error::ResourceExhausted("acyclic request queue full"))?;
        Ok(RequestHandle(id))
    }

    /// Like [`Master::issue`], but marked internal so [`Arbiter::ready_transfers`] dispatches it
    /// regardless of the target slave's lifecycle state; used only by the lifecycle-driving code
    /// below to get a slave to `preop` in the first place.
    fn issue_internal(
        &mut self,
        slave_index: usize,
        kind: RequestKind,
        address: Address,
        payload: heapless::Vec<u8, 256>,
    ) -> Result<u32, Error> {
        self.arbiter
            .enqueue_internal(slave_index, kind, address, payload)
            .ok_or(Error::ResourceExhausted("acyclic request queue full"))
    }

    pub fn issue_parameter_read(&mut self, slave: SlaveRef, index: u16, subindex: u8) -> Result<RequestHandle, Error> {
        self.issue(
            slave,
            RequestKind::ParameterRead,
            index_subindex_address(index, subindex),
            heapless::Vec::new(),
        )
    }

    pub fn issue_parameter_write(
        &mut self,
        slave: SlaveRef,
        index: u16,
        subindex: u8,
        payload: heapless::Vec<u8, 256>,
    ) -> Result<RequestHandle, Error> {
        self.issue(
            slave,
            RequestKind::ParameterWrite,
            index_subindex_address(index, subindex),
            payload,
        )
    }

    pub fn issue_register_read(&mut self, slave: SlaveRef, offset: u16, len: u16) -> Result<RequestHandle, Error> {
        let mut payload = heapless::Vec::new();
        let _ = payload.resize(usize::from(len), 0);
        self.issue(
            slave,
            RequestKind::RegisterRead,
            Address::Physical {
                node: self.slaves[slave.0].configured_address,
                offset,
            },
            payload,
        )
    }

    pub fn issue_register_write(
        &mut self,
        slave: SlaveRef,
        offset: u16,
        payload: heapless::Vec<u8, 256>,
    ) -> Result<RequestHandle, Error> {
        let node = self.slaves[slave.0].configured_address;
        self.issue(
            slave,
            RequestKind::RegisterWrite,
            Address::Physical { node, offset },
            payload,
        )
    }

    pub fn issue_file_read(&mut self, slave: SlaveRef, handle: u16) -> Result<RequestHandle, Error> {
        self.issue(
            slave,
            RequestKind::FileRead,
            index_subindex_address(handle, 0),
            heapless::Vec::new(),
        )
    }

    pub fn issue_file_write(
        &mut self,
        slave: SlaveRef,
        handle: u16,
        payload: heapless::Vec<u8, 256>,
    ) -> Result<RequestHandle, Error> {
        self.issue(
            slave,
            RequestKind::FileWrite,
            index_subindex_address(handle, 0),
            payload,
        )
    }

    /// Read one IDN element on `drive_number`'s service channel.
    pub fn issue_service_channel_read(&mut self, slave: SlaveRef, drive_number: u8, idn: u16) -> Result<RequestHandle, Error> {
        self.issue(
            slave,
            RequestKind::ServiceChannelRead,
            drive_idn_address(drive_number, idn),
            heapless::Vec::new(),
        )
    }

    /// Write one IDN element on `drive_number`'s service channel.
    pub fn issue_service_channel_write(
        &mut self,
        slave: SlaveRef,
        drive_number: u8,
        idn: u16,
        payload: heapless::Vec<u8, 256>,
    ) -> Result<RequestHandle, Error> {
        self.issue(
            slave,
            RequestKind::ServiceChannelWrite,
            drive_idn_address(drive_number, idn),
            payload,
        )
    }

    pub fn request_phase(&self, handle: &RequestHandle) -> Option<crate::acyclic::RequestPhase> {
        self.arbiter.phase_of(handle.0)
    }

    /// Payload of a completed request, available until it's dropped with
    /// [`Master::drain_completed_requests`].
    pub fn request_payload(&self, handle: &RequestHandle) -> Option<&[u8]> {
        self.arbiter.payload_of(handle.0)
    }

    /// Drop every acyclic request that has reached a terminal phase. Callers that read a
    /// request's payload with [`Master::request_payload`] should do so before calling this.
    pub fn drain_completed_requests(&mut self) {
        let _ = self.arbiter.drain_terminal();
    }

    /// Counts of protocol violations and topology changes observed since this master was created.
    pub fn anomaly_counters(&self) -> AnomalyCounters {
        let (topology_changed, protocol_violation) = self.engine.anomaly_counters();
        AnomalyCounters { protocol_violation, topology_changed }
    }

    /// Step one slave's lifecycle FSM by one request. If a transition is already in flight,
    /// drives it forward instead of starting a new one.
    fn step_lifecycle(&mut self, slave_index: usize) {
        if self.drive_transition(slave_index) {
            return;
        }

        let slave = &self.slaves[slave_index];
        let observed = ControlStatusWord {
            state: slave.current_state,
            error: false,
            acknowledge_request: false,
        };

        match lifecycle::step(observed, slave.target_state) {
            Step::Idle => {}
            Step::Acknowledge => self.begin_acknowledge(slave_index, lifecycle::MAX_TRANSITION_RETRIES),
            Step::Configure(LifecycleState::SafeOp) => {
                self.begin_safeop_stage(slave_index, SafeOpStage::SyncManager(0), lifecycle::MAX_TRANSITION_RETRIES)
            }
            Step::Configure(LifecycleState::PreOp) => self.begin_preop_configuration(slave_index),
            Step::Configure(other) | Step::Request(other) => {
                self.begin_control_write(slave_index, other, lifecycle::MAX_TRANSITION_RETRIES)
            }
        }
    }

    /// Advance whatever lifecycle work is already in flight for this slave. Returns `true` if
    /// there was something to drive (whether or not it completed this tick).
    fn drive_transition(&mut self, slave_index: usize) -> bool {
        let Some(inflight) = self.slaves[slave_index].transition.inner.clone() else {
            return false;
        };

        match inflight {
            InFlight::WriteControl { request, target, retries_left } => {
                self.drive_write_control(slave_index, request, target, retries_left)
            }
            InFlight::PollStatus { request, target, retries_left } => {
                self.drive_poll_status(slave_index, request, target, retries_left)
            }
            InFlight::WriteSafeOpPage { request, stage, retries_left } => {
                self.drive_safeop_page(slave_index, request, stage, retries_left)
            }
            InFlight::ConfigurePreOp { request, sync_manager_index, remaining, phase } => {
                self.drive_preop_configuration(slave_index, request, sync_manager_index, remaining, phase)
            }
            InFlight::WriteAcknowledge { request, retries_left } => {
                self.drive_write_acknowledge(slave_index, request, retries_left)
            }
        }

        true
    }

    /// Write `target` into the control register and start polling the status register for it.
    fn begin_control_write(&mut self, slave_index: usize, target: LifecycleState, retries_left: u32) {
        let csw = ControlStatusWord { state: target, error: false, acknowledge_request: false };
        let payload = heapless::Vec::from_slice(&csw.pack()).unwrap_or_default();
        let node = self.slaves[slave_index].configured_address;

        match self.issue_internal(
            slave_index,
            RequestKind::RegisterWrite,
            Address::Physical { node, offset: CONTROL_REGISTER_OFFSET },
            payload,
        ) {
            Ok(request) => {
                self.slaves[slave_index].transition.inner =
                    Some(InFlight::WriteControl { request, target, retries_left });
            }
            Err(_) => {
                log::warn!("acyclic queue full, deferring control-register write for slave {slave_index}");
            }
        }
    }

    fn drive_write_control(&mut self, slave_index: usize, request: u32, target: LifecycleState, retries_left: u32) {
        match self.arbiter.phase_of(request) {
            Some(RequestPhase::Success) => {
                self.arbiter.remove(request);
                self.slaves[slave_index].transition.inner = None;
                self.begin_poll_status(slave_index, target, lifecycle::MAX_TRANSITION_RETRIES);
            }
            Some(RequestPhase::Failed) => {
                self.arbiter.remove(request);
                self.retry_or_abandon_control_write(slave_index, target, retries_left);
            }
            Some(_) => {}
            None => self.retry_or_abandon_control_write(slave_index, target, retries_left),
        }
    }

    fn retry_or_abandon_control_write(&mut self, slave_index: usize, target: LifecycleState, retries_left: u32) {
        self.slaves[slave_index].transition.inner = None;
        if retries_left == 0 {
            log::warn!(
                "giving up requesting {target:?} for slave {slave_index} after {} retries",
                lifecycle::MAX_TRANSITION_RETRIES
            );
            return;
        }
        self.begin_control_write(slave_index, target, retries_left - 1);
    }

    fn begin_poll_status(&mut self, slave_index: usize, target: LifecycleState, retries_left: u32) {
        let node = self.slaves[slave_index].configured_address;
        let mut payload: heapless::Vec<u8, 256> = heapless::Vec::new();
        let _ = payload.resize(2, 0);

        match self.issue_internal(
            slave_index,
            RequestKind::RegisterRead,
            Address::Physical { node, offset: STATUS_REGISTER_OFFSET },
            payload,
        ) {
            Ok(request) => {
                self.slaves[slave_index].transition.inner =
                    Some(InFlight::PollStatus { request, target, retries_left });
            }
            Err(_) => {
                log::warn!("acyclic queue full, deferring status-register poll for slave {slave_index}");
            }
        }
    }

    fn drive_poll_status(&mut self, slave_index: usize, request: u32, target: LifecycleState, retries_left: u32) {
        match self.arbiter.phase_of(request) {
            Some(RequestPhase::Success) => {
                let mut buf = [0u8; 2];
                if let Some(payload) = self.arbiter.payload_of(request) {
                    let len = payload.len().min(buf.len());
                    buf[..len].copy_from_slice(&payload[..len]);
                }
                self.arbiter.remove(request);

                match ControlStatusWord::unpack_from_slice(&buf) {
                    Ok(csw) if csw.error => {
                        self.slaves[slave_index].transition.inner = None;
                        self.begin_acknowledge(slave_index, lifecycle::MAX_TRANSITION_RETRIES);
                    }
                    Ok(csw) if csw.state == target => {
                        self.slaves[slave_index].current_state = target;
                        self.slaves[slave_index].transition.inner = None;
                    }
                    _ => self.retry_or_abandon_poll(slave_index, target, retries_left),
                }
            }
            Some(RequestPhase::Failed) => {
                self.arbiter.remove(request);
                self.retry_or_abandon_poll(slave_index, target, retries_left);
            }
            Some(_) => {}
            None => self.retry_or_abandon_poll(slave_index, target, retries_left),
        }
    }

    fn retry_or_abandon_poll(&mut self, slave_index: usize, target: LifecycleState, retries_left: u32) {
        self.slaves[slave_index].transition.inner = None;
        if retries_left == 0 {
            log::warn!(
                "giving up waiting for slave {slave_index} to reach {target:?} after {} retries",
                lifecycle::MAX_TRANSITION_RETRIES
            );
            return;
        }
        self.begin_poll_status(slave_index, target, retries_left - 1);
    }

    /// Write the next sync-manager/mapper configuration page, or request `safeop` once both
    /// collections are exhausted.
    fn begin_safeop_stage(&mut self, slave_index: usize, stage: SafeOpStage, retries_left: u32) {
        let node = self.slaves[slave_index].configured_address;

        let (offset, payload) = match stage {
            SafeOpStage::SyncManager(i) => {
                let sm = self.slaves[slave_index].sync_managers.get(i).cloned();
                match sm {
                    Some(sm) => (
                        SYNC_MANAGER_PAGE_BASE + (i as u16) * SYNC_MANAGER_PAGE_LEN,
                        encode_sync_manager_page(&sm),
                    ),
                    None => {
                        self.begin_safeop_stage(slave_index, SafeOpStage::Mapper(0), lifecycle::MAX_TRANSITION_RETRIES);
                        return;
                    }
                }
            }
            SafeOpStage::Mapper(i) => {
                let entry = self.slaves[slave_index].mappers.get(i).copied();
                match entry {
                    Some(entry) => (
                        MAPPER_PAGE_BASE + (i as u16) * MAPPER_PAGE_LEN,
                        encode_mapper_page(&entry),
                    ),
                    None => {
                        self.begin_control_write(slave_index, LifecycleState::SafeOp, lifecycle::MAX_TRANSITION_RETRIES);
                        return;
                    }
                }
            }
        };

        match self.issue_internal(slave_index, RequestKind::RegisterWrite, Address::Physical { node, offset }, payload) {
            Ok(request) => {
                self.slaves[slave_index].transition.inner =
                    Some(InFlight::WriteSafeOpPage { request, stage, retries_left });
            }
            Err(_) => {
                log::warn!("acyclic queue full, deferring safeop page write for slave {slave_index}");
            }
        }
    }

    fn drive_safeop_page(&mut self, slave_index: usize, request: u32, stage: SafeOpStage, retries_left: u32) {
        match self.arbiter.phase_of(request) {
            Some(RequestPhase::Success) => {
                self.arbiter.remove(request);
                self.slaves[slave_index].transition.inner = None;
                let next_stage = match stage {
                    SafeOpStage::SyncManager(i) => SafeOpStage::SyncManager(i + 1),
                    SafeOpStage::Mapper(i) => SafeOpStage::Mapper(i + 1),
                };
                self.begin_safeop_stage(slave_index, next_stage, lifecycle::MAX_TRANSITION_RETRIES);
            }
            Some(RequestPhase::Failed) => {
                self.arbiter.remove(request);
                self.retry_or_abandon_safeop_page(slave_index, stage, retries_left);
            }
            Some(_) => {}
            None => self.retry_or_abandon_safeop_page(slave_index, stage, retries_left),
        }
    }

    fn retry_or_abandon_safeop_page(&mut self, slave_index: usize, stage: SafeOpStage, retries_left: u32) {
        self.slaves[slave_index].transition.inner = None;
        if retries_left == 0 {
            log::warn!(
                "giving up writing safeop page {stage:?} for slave {slave_index} after {} retries",
                lifecycle::MAX_TRANSITION_RETRIES
            );
            return;
        }
        self.begin_safeop_stage(slave_index, stage, retries_left - 1);
    }

    /// Walk every sync manager not reserved for the mailbox, reading back its parameter-object
    /// assignment and rewriting it if it differs from what's declared, before requesting `preop`.
    /// Slaves that don't advertise both the mailbox-CoE and parameter-object-configuration
    /// capabilities are skipped straight to requesting `preop`.
    fn begin_preop_configuration(&mut self, slave_index: usize) {
        let capabilities = self.slaves[slave_index].capabilities;
        let sync_manager_count = self.slaves[slave_index].sync_managers.len();

        if !capabilities.contains(Capabilities::MAILBOX_COE)
            || !capabilities.contains(Capabilities::PARAMETER_OBJECT_CONFIGURATION)
        {
            log::warn!(
                "slave {slave_index} lacks mailbox-CoE/parameter-object-configuration capability; \
                 requesting preop without touching its parameter-object assignment"
            );
            self.begin_control_write(slave_index, LifecycleState::PreOp, lifecycle::MAX_TRANSITION_RETRIES);
            return;
        }

        let mut remaining: heapless::Vec<u8, { lifecycle::MAX_CONFIGURABLE_SYNC_MANAGERS }> = heapless::Vec::new();
        for index in 2..sync_manager_count {
            let _ = remaining.push(index as u8);
        }

        self.advance_preop_queue(slave_index, remaining);
    }

    /// Pop the next sync manager to examine off `remaining`, or request `preop` once none remain.
    fn advance_preop_queue(
        &mut self,
        slave_index: usize,
        mut remaining: heapless::Vec<u8, { lifecycle::MAX_CONFIGURABLE_SYNC_MANAGERS }>,
    ) {
        if remaining.is_empty() {
            self.begin_control_write(slave_index, LifecycleState::PreOp, lifecycle::MAX_TRANSITION_RETRIES);
            return;
        }
        let sync_manager_index = remaining.remove(0);
        self.drive_preop_transfer(slave_index, sync_manager_index, remaining, PreOpPhase::Reading(ReadPass::start(sync_manager_index)));
    }

    /// Issue the current phase's next transfer, or, once it has none left to offer, conclude it.
    fn drive_preop_transfer(
        &mut self,
        slave_index: usize,
        sync_manager_index: u8,
        remaining: heapless::Vec<u8, { lifecycle::MAX_CONFIGURABLE_SYNC_MANAGERS }>,
        phase: PreOpPhase,
    ) {
        let transfer = match &phase {
            PreOpPhase::Reading(pass) => pass.next_transfer(),
            PreOpPhase::Configuring(pass) => pass.next_transfer(),
        };

        let Some(transfer) = transfer else {
            self.finish_preop_phase(slave_index, sync_manager_index, remaining, phase);
            return;
        };

        match self.issue_transfer(slave_index, &transfer) {
            Ok(request) => {
                self.slaves[slave_index].transition.inner = Some(InFlight::ConfigurePreOp {
                    request,
                    sync_manager_index,
                    remaining,
                    phase,
                });
            }
            Err(_) => {
                log::warn!("acyclic queue full, deferring parameter-object transfer for slave {slave_index}");
            }
        }
    }

    fn issue_transfer(&mut self, slave_index: usize, transfer: &Transfer) -> Result<u32, Error> {
        match transfer {
            Transfer::Read { index, subindex, expected_len } => {
                let mut payload: heapless::Vec<u8, 256> = heapless::Vec::new();
                let _ = payload.resize(*expected_len, 0);
                self.issue_internal(slave_index, RequestKind::ParameterRead, index_subindex_address(*index, *subindex), payload)
            }
            Transfer::Write { index, subindex, payload } => {
                let mut buf: heapless::Vec<u8, 256> = heapless::Vec::new();
                let _ = buf.extend_from_slice(payload);
                self.issue_internal(slave_index, RequestKind::ParameterWrite, index_subindex_address(*index, *subindex), buf)
            }
        }
    }

    fn drive_preop_configuration(
        &mut self,
        slave_index: usize,
        request: u32,
        sync_manager_index: u8,
        remaining: heapless::Vec<u8, { lifecycle::MAX_CONFIGURABLE_SYNC_MANAGERS }>,
        phase: PreOpPhase,
    ) {
        let transfer = match &phase {
            PreOpPhase::Reading(pass) => pass.next_transfer(),
            PreOpPhase::Configuring(pass) => pass.next_transfer(),
        };
        let is_write = matches!(transfer, Some(Transfer::Write { .. }));

        match self.arbiter.phase_of(request) {
            Some(RequestPhase::Success) => {
                let mut buf = [0u8; 256];
                let len = self
                    .arbiter
                    .payload_of(request)
                    .map(|p| {
                        let l = p.len().min(buf.len());
                        buf[..l].copy_from_slice(&p[..l]);
                        l
                    })
                    .unwrap_or(0);
                self.arbiter.remove(request);

                let outcome = if is_write { Outcome::WriteOk } else { Outcome::ReadOk(&buf[..len]) };
                let advanced = advance_preop_phase(phase, outcome);
                self.drive_preop_transfer(slave_index, sync_manager_index, remaining, advanced);
            }
            Some(RequestPhase::Failed) => {
                self.arbiter.remove(request);
                let advanced = advance_preop_phase(phase, Outcome::Failed);
                self.drive_preop_transfer(slave_index, sync_manager_index, remaining, advanced);
            }
            Some(_) => {
                self.slaves[slave_index].transition.inner = Some(InFlight::ConfigurePreOp {
                    request,
                    sync_manager_index,
                    remaining,
                    phase,
                });
            }
            None => {
                let advanced = advance_preop_phase(phase, Outcome::Failed);
                self.drive_preop_transfer(slave_index, sync_manager_index, remaining, advanced);
            }
        }
    }

    /// A read pass concluding decides whether a write pass is needed; a write pass concluding (or
    /// either pass failing) always moves on to the next sync manager in the queue.
    fn finish_preop_phase(
        &mut self,
        slave_index: usize,
        sync_manager_index: u8,
        remaining: heapless::Vec<u8, { lifecycle::MAX_CONFIGURABLE_SYNC_MANAGERS }>,
        phase: PreOpPhase,
    ) {
        match phase {
            PreOpPhase::Reading(ReadPass::Done { entries }) => {
                let mut desired: heapless::Vec<crate::slave::ParameterObject, 64> = heapless::Vec::new();
                if let Some(sm) = self.slaves[slave_index].sync_managers.get(usize::from(sync_manager_index)) {
                    for object in sm.parameter_objects.iter() {
                        let _ = desired.push(*object);
                    }
                }

                if differs(&desired, &entries) {
                    let pass = ConfigurePass::start(sync_manager_index, desired);
                    self.drive_preop_transfer(slave_index, sync_manager_index, remaining, PreOpPhase::Configuring(pass));
                } else {
                    self.advance_preop_queue(slave_index, remaining);
                }
            }
            PreOpPhase::Reading(ReadPass::Failed) => {
                log::warn!(
                    "failed to read back parameter-object assignment for slave {slave_index} sync manager {sync_manager_index}"
                );
                self.advance_preop_queue(slave_index, remaining);
            }
            PreOpPhase::Reading(_) => self.advance_preop_queue(slave_index, remaining),
            PreOpPhase::Configuring(ConfigurePass::Failed) => {
                log::warn!(
                    "failed to configure parameter-object assignment for slave {slave_index} sync manager {sync_manager_index}"
                );
                self.advance_preop_queue(slave_index, remaining);
            }
            PreOpPhase::Configuring(_) => self.advance_preop_queue(slave_index, remaining),
        }
    }

    fn begin_acknowledge(&mut self, slave_index: usize, retries_left: u32) {
        let csw = ControlStatusWord { state: LifecycleState::Init, error: false, acknowledge_request: true };
        let payload = heapless::Vec::from_slice(&csw.pack()).unwrap_or_default();
        let node = self.slaves[slave_index].configured_address;

        match self.issue_internal(
            slave_index,
            RequestKind::RegisterWrite,
            Address::Physical { node, offset: CONTROL_REGISTER_OFFSET },
            payload,
        ) {
            Ok(request) => {
                self.slaves[slave_index].transition.inner = Some(InFlight::WriteAcknowledge { request, retries_left });
            }
            Err(_) => {
                log::warn!("acyclic queue full, deferring error acknowledge for slave {slave_index}");
            }
        }
    }

    fn drive_write_acknowledge(&mut self, slave_index: usize, request: u32, retries_left: u32) {
        match self.arbiter.phase_of(request) {
            Some(RequestPhase::Success) => {
                self.arbiter.remove(request);
                self.slaves[slave_index].current_state = LifecycleState::Init;
                self.slaves[slave_index].transition.inner = None;
            }
            Some(RequestPhase::Failed) => {
                self.arbiter.remove(request);
                self.retry_or_abandon_acknowledge(slave_index, retries_left);
            }
            Some(_) => {}
            None => self.retry_or_abandon_acknowledge(slave_index, retries_left),
        }
    }

    fn retry_or_abandon_acknowledge(&mut self, slave_index: usize, retries_left: u32) {
        self.slaves[slave_index].transition.inner = None;
        if retries_left == 0 {
            log::warn!(
                "giving up acknowledging the error on slave {slave_index} after {} retries",
                lifecycle::MAX_TRANSITION_RETRIES
            );
            return;
        }
        self.begin_acknowledge(slave_index, retries_left - 1);
    }
}

/// Both halves of [`PreOpPhase`] are driven the same way: feed `outcome` to whichever pass is
/// active and keep its variant.
fn advance_preop_phase(phase: PreOpPhase, outcome: Outcome<'_>) -> PreOpPhase {
    match phase {
        PreOpPhase::Reading(pass) => PreOpPhase::Reading(pass.advance(outcome)),
        PreOpPhase::Configuring(pass) => PreOpPhase::Configuring(pass.advance(outcome)),
    }
}

/// Parameter/service-channel addressing is logical to the dictionary, not a physical node
/// offset; reuse the broadcast-free logical slot of [`Address`] to carry `(index, subindex)`.
fn index_subindex_address(index: u16, subindex: u8) -> Address {
    Address::Logical((u32::from(index) << 8) | u32::from(subindex))
}

/// Service-channel addressing is two-field: a drive number plus an IDN (parameter number),
/// distinct from the single-dictionary `(index, subindex)` addressing parameter objects use.
fn drive_idn_address(drive_number: u8, idn: u16) -> Address {
    Address::Logical((u32::from(drive_number) << 16) | u32::from(idn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_master_is_exclusive_per_index() {
        let mut registry: MasterRegistry<2> = MasterRegistry::new();
        let first = registry.request(0).unwrap();
        assert!(registry.request(0).is_err());
        registry.release(first);
        assert!(registry.request(0).is_ok());
    }

    #[test]
    fn register_slave_rejects_identity_mismatch() {
        let mut master: Master<4> = Master::new(MasterConfig::builder().interface_name("eth0").build().unwrap());
        let identity = Identity { vendor_id: 1, product_code: 2, revision: 0, serial: 0 };
        assert!(master.register_slave(0, 1, 3, identity).is_err());
        assert!(master.register_slave(0, 1, 2, identity).is_ok());
    }
}
