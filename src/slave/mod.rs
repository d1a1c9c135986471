//! The in-memory slave model.
//!
//! A [`Slave`] is pure data plus derived queries; every field mutation goes through
//! [`lifecycle`](crate::slave::lifecycle)'s FSM. Application code only ever sees `&Slave`.

pub mod lifecycle;
pub mod parameter_object;
mod types;

pub use types::{
    Capabilities, Identity, MapperEntry, MapperEntryRef, ParameterObject, SyncManager,
    SyncManagerDirection,
};

use lifecycle::LifecycleState;
use lifecycle::TransitionSlot;

/// A slave's position in the ring. Also its index into the master's slave table.
pub type RingPosition = u16;

/// In-memory representation of one field device.
#[derive(Debug, Clone)]
pub struct Slave {
    pub identity: Identity,
    pub ring_position: RingPosition,
    /// Station address assigned by the master after discovery.
    pub configured_address: u16,
    /// Number of memory mappers this slave's hardware exposes.
    pub mapper_count: u8,
    pub current_state: LifecycleState,
    pub target_state: LifecycleState,
    pub sync_managers: heapless::Vec<SyncManager, 16>,
    pub mappers: heapless::Vec<MapperEntry, 16>,
    /// Optional device-description match recovered from the environment directory.
    pub description: Option<crate::device_description::DeviceDescription>,
    /// Mailbox-CoE / parameter-object-configuration capability bits, set once discovery (or a
    /// caller acting on its behalf) has read the slave's capability register.
    pub capabilities: Capabilities,
    /// Bookkeeping for the lifecycle-transition request currently in flight, if any; driven by
    /// [`crate::master::Master::tick`], never touched directly by application code.
    pub(crate) transition: TransitionSlot,
}

impl Slave {
    pub fn new(identity: Identity, ring_position: RingPosition) -> Self {
        Self {
            identity,
            ring_position,
            configured_address: 0,
            mapper_count: 0,
            current_state: LifecycleState::Unknown,
            target_state: LifecycleState::Unknown,
            sync_managers: heapless::Vec::new(),
            mappers: heapless::Vec::new(),
            description: None,
            capabilities: Capabilities::empty(),
            transition: TransitionSlot::default(),
        }
    }

    /// The memory-mapper entry relocating the given sync manager into the logical process
    /// image, if one has been declared.
    pub fn fmmu_for(&self, sync_manager_index: u8) -> Option<&MapperEntry> {
        self.mappers
            .iter()
            .find(|m| m.sync_manager_index == sync_manager_index)
    }

    /// The lowest-indexed sync manager not reserved for the mailbox/service-channel pair, i.e.
    /// the first candidate for process-data mapping.
    pub fn first_sync_manager_not_reserved_for_mailbox(&self) -> Option<(u8, &SyncManager)> {
        self.sync_managers
            .iter()
            .enumerate()
            .skip(2) // sync managers 0/1 are conventionally the mailbox out/in pair
            .map(|(i, sm)| (i as u8, sm))
            .next()
    }

    pub fn configured_direction_of(&self, sync_manager_index: u8) -> Option<SyncManagerDirection> {
        self.sync_managers
            .get(usize::from(sync_manager_index))
            .map(|sm| sm.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slave() -> Slave {
        Slave::new(
            Identity {
                vendor_id: 1,
                product_code: 2,
                revision: 3,
                serial: 4,
            },
            0,
        )
    }

    #[test]
    fn first_non_mailbox_sync_manager_skips_first_two() {
        let mut s = slave();
        for direction in [
            SyncManagerDirection::MasterOut,
            SyncManagerDirection::MasterIn,
            SyncManagerDirection::MasterOut,
        ] {
            s.sync_managers
                .push(SyncManager {
                    physical_start: 0,
                    length: 0,
                    direction,
                    enabled: true,
                    parameter_objects: heapless::Vec::new(),
                })
                .unwrap();
        }

        let (index, sm) = s.first_sync_manager_not_reserved_for_mailbox().unwrap();
        assert_eq!(index, 2);
        assert_eq!(sm.direction, SyncManagerDirection::MasterOut);
    }
}
