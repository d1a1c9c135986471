//! Supporting data types for [`super::Slave`].

bitflags::bitflags! {
    /// Capability bits a slave advertises, read from its capability register during discovery.
    ///
    /// Checked by [`super::lifecycle`]'s `preop` configuration step before it will run the
    /// parameter-object sub-FSM against a sync manager: a slave missing either bit is skipped
    /// with a warning rather than configured.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// The slave's mailbox supports the CANopen-over-fieldbus service-channel protocol.
        const MAILBOX_COE = 0b0000_0001;
        /// The slave allows the master to (re)write a sync manager's parameter-object
        /// assignment rather than relying on a fixed factory mapping.
        const PARAMETER_OBJECT_CONFIGURATION = 0b0000_0010;
    }
}

/// Identity fields read from a slave during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub vendor_id: u32,
    pub product_code: u32,
    pub revision: u32,
    pub serial: u32,
}

/// Which direction process data flows through a sync manager, from the master's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncManagerDirection {
    /// Master writes, slave reads (outputs).
    MasterOut,
    /// Slave writes, master reads (inputs).
    MasterIn,
}

/// A slave's sync manager: a physical memory window the slave's hardware guards against
/// concurrent master/application access.
#[derive(Debug, Clone)]
pub struct SyncManager {
    pub physical_start: u16,
    pub length: u16,
    pub direction: SyncManagerDirection,
    pub enabled: bool,
    /// Parameter objects reachable through this sync manager when it is a service channel.
    pub parameter_objects: heapless::Vec<ParameterObject, 32>,
}

/// One entry of a slave's memory mapper, relocating part of a sync manager's physical window
/// into a domain's logical process image.
#[derive(Debug, Clone, Copy)]
pub struct MapperEntry {
    pub sync_manager_index: u8,
    pub logical_start_bit: u32,
    pub length_bits: u16,
    pub physical_start_bit: u16,
}

/// A reference to a mapper entry together with the slave that owns it, used by the domain
/// builder when it walks every slave's mappers in registration order.
#[derive(Debug, Clone, Copy)]
pub struct MapperEntryRef {
    pub slave_index: usize,
    pub entry: MapperEntry,
}

/// A single addressable parameter on a slave's service channel, identified by an
/// `(index, subindex)` pair, with a declared bit length used both to size the service-channel
/// transfer and to detect whether a write actually changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterObject {
    pub index: u16,
    pub subindex: u8,
    pub bit_length: u16,
}
