//! The parameter-object service-channel sub-FSM.
//!
//! Each step issues exactly one service-channel transfer and suspends; the driving lifecycle FSM
//! (during `preop`) feeds the transfer's result back in on the next tick via
//! [`ReadPass::advance`] / [`ConfigurePass::advance`]. Nothing here touches the wire directly —
//! that's the acyclic arbiter's job, turning a [`Transfer`] into a service sub-command.

use super::types::ParameterObject;

/// Dictionary base for a sync manager's parameter-object assignment list.
pub const ASSIGNMENT_BASE_INDEX: u16 = 0x1c10;

const MAX_ASSIGNED: usize = 64;
const MAX_ENTRIES_PER_OBJECT: usize = 32;

/// A single service-channel transfer the sub-FSM wants performed next.
#[derive(Debug, Clone)]
pub enum Transfer {
    Read {
        index: u16,
        subindex: u8,
        expected_len: usize,
    },
    Write {
        index: u16,
        subindex: u8,
        payload: heapless::Vec<u8, 4>,
    },
}

/// What happened to a previously-issued [`Transfer`], fed back into the pass on its next step.
pub enum Outcome<'a> {
    ReadOk(&'a [u8]),
    WriteOk,
    Failed,
}

/// Driving the read pass for one sync manager to completion.
#[derive(Debug, Clone)]
pub enum ReadPass {
    AssignmentCount {
        sync_manager_index: u8,
    },
    AssignmentEntry {
        sync_manager_index: u8,
        pos: u8,
        count: u8,
        pdo_indices: heapless::Vec<u16, MAX_ASSIGNED>,
    },
    ObjectEntryCount {
        sync_manager_index: u8,
        pdo_indices: heapless::Vec<u16, MAX_ASSIGNED>,
        current: usize,
        entries: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
    },
    ObjectEntry {
        sync_manager_index: u8,
        pdo_indices: heapless::Vec<u16, MAX_ASSIGNED>,
        current: usize,
        entry_pos: u8,
        entry_count: u8,
        object_entries: heapless::Vec<ParameterObject, MAX_ENTRIES_PER_OBJECT>,
        entries: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
    },
    Done {
        entries: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
    },
    Failed,
}

impl ReadPass {
    pub fn start(sync_manager_index: u8) -> Self {
        ReadPass::AssignmentCount { sync_manager_index }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadPass::Done { .. } | ReadPass::Failed)
    }

    /// The transfer this pass wants performed to make progress, if it hasn't concluded.
    pub fn next_transfer(&self) -> Option<Transfer> {
        match self {
            ReadPass::AssignmentCount { sync_manager_index } => Some(Transfer::Read {
                index: ASSIGNMENT_BASE_INDEX + u16::from(*sync_manager_index),
                subindex: 0,
                expected_len: 1,
            }),
            ReadPass::AssignmentEntry {
                sync_manager_index,
                pos,
                count,
                ..
            } => {
                if pos > count {
                    None
                } else {
                    Some(Transfer::Read {
                        index: ASSIGNMENT_BASE_INDEX + u16::from(*sync_manager_index),
                        subindex: *pos,
                        expected_len: 2,
                    })
                }
            }
            ReadPass::ObjectEntryCount {
                pdo_indices,
                current,
                ..
            } => pdo_indices.get(*current).map(|pdo_index| Transfer::Read {
                index: *pdo_index,
                subindex: 0,
                expected_len: 1,
            }),
            ReadPass::ObjectEntry {
                pdo_indices,
                current,
                entry_pos,
                entry_count,
                ..
            } => {
                if entry_pos > entry_count {
                    None
                } else {
                    pdo_indices.get(*current).map(|pdo_index| Transfer::Read {
                        index: *pdo_index,
                        subindex: *entry_pos,
                        expected_len: 4,
                    })
                }
            }
            ReadPass::Done { .. } | ReadPass::Failed => None,
        }
    }

    /// Feed the outcome of `next_transfer()` in, advancing to the next state.
    pub fn advance(self, outcome: Outcome<'_>) -> Self {
        let Outcome::ReadOk(payload) = outcome else {
            return ReadPass::Failed;
        };

        match self {
            ReadPass::AssignmentCount { sync_manager_index } => {
                let Some(&count) = payload.first() else {
                    return ReadPass::Failed;
                };
                ReadPass::AssignmentEntry {
                    sync_manager_index,
                    pos: 1,
                    count,
                    pdo_indices: heapless::Vec::new(),
                }
            }
            ReadPass::AssignmentEntry {
                sync_manager_index,
                pos,
                count,
                mut pdo_indices,
            } => {
                if payload.len() < 2 {
                    return ReadPass::Failed;
                }
                let pdo_index = u16::from_le_bytes([payload[0], payload[1]]);
                if pdo_indices.push(pdo_index).is_err() {
                    return ReadPass::Failed;
                }

                if pos < count {
                    ReadPass::AssignmentEntry {
                        sync_manager_index,
                        pos: pos + 1,
                        count,
                        pdo_indices,
                    }
                } else {
                    ReadPass::ObjectEntryCount {
                        sync_manager_index,
                        pdo_indices,
                        current: 0,
                        entries: heapless::Vec::new(),
                    }
                }
            }
            ReadPass::ObjectEntryCount {
                sync_manager_index,
                pdo_indices,
                current,
                entries,
            } => {
                let Some(&entry_count) = payload.first() else {
                    return ReadPass::Failed;
                };
                let _ = sync_manager_index;
                ReadPass::ObjectEntry {
                    sync_manager_index,
                    pdo_indices,
                    current,
                    entry_pos: 1,
                    entry_count,
                    object_entries: heapless::Vec::new(),
                    entries,
                }
            }
            ReadPass::ObjectEntry {
                sync_manager_index,
                pdo_indices,
                current,
                entry_pos,
                entry_count,
                mut object_entries,
                mut entries,
            } => {
                if payload.len() < 4 {
                    return ReadPass::Failed;
                }
                let raw = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let index = (raw >> 16) as u16;
                let subindex = ((raw >> 8) & 0xff) as u8;
                let bit_length = (raw & 0xff) as u16;

                // index=0, subindex=0 is gap padding: not a real parameter object.
                if !(index == 0 && subindex == 0)
                    && object_entries
                        .push(ParameterObject {
                            index,
                            subindex,
                            bit_length,
                        })
                        .is_err()
                {
                    return ReadPass::Failed;
                }

                if entry_pos < entry_count {
                    ReadPass::ObjectEntry {
                        sync_manager_index,
                        pdo_indices,
                        current,
                        entry_pos: entry_pos + 1,
                        entry_count,
                        object_entries,
                        entries,
                    }
                } else {
                    for entry in object_entries {
                        if entries.push(entry).is_err() {
                            return ReadPass::Failed;
                        }
                    }

                    if current + 1 < pdo_indices.len() {
                        ReadPass::ObjectEntryCount {
                            sync_manager_index,
                            pdo_indices,
                            current: current + 1,
                            entries,
                        }
                    } else {
                        ReadPass::Done { entries }
                    }
                }
            }
            ReadPass::Done { .. } | ReadPass::Failed => ReadPass::Failed,
        }
    }
}

/// Driving the configuration pass for one sync manager to completion. Only entered once
/// [`differs`] has established the desired list doesn't match the read-back one.
///
/// `pos` is always the 1-based position in `desired` of the entry currently being configured,
/// carried unchanged through the three writes (`WriteObjectEntry`, `WriteObjectEntryCount`,
/// `WriteAssignmentEntry`) that configure it, so advancing to the next entry is always
/// `pos + 1` rather than re-derived from the written payload.
#[derive(Debug, Clone)]
pub enum ConfigurePass {
    ClearAssignment {
        sync_manager_index: u8,
        desired: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
    },
    WriteObjectEntry {
        sync_manager_index: u8,
        desired: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
        pos: u8,
    },
    WriteObjectEntryCount {
        sync_manager_index: u8,
        desired: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
        pos: u8,
    },
    WriteAssignmentEntry {
        sync_manager_index: u8,
        desired: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
        pos: u8,
    },
    WriteAssignmentCount {
        sync_manager_index: u8,
        count: u8,
    },
    Done,
    Failed,
}

impl ConfigurePass {
    pub fn start(
        sync_manager_index: u8,
        desired: heapless::Vec<ParameterObject, MAX_ASSIGNED>,
    ) -> Self {
        ConfigurePass::ClearAssignment {
            sync_manager_index,
            desired,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConfigurePass::Done | ConfigurePass::Failed)
    }

    pub fn next_transfer(&self) -> Option<Transfer> {
        match self {
            ConfigurePass::ClearAssignment { sync_manager_index, .. } => Some(Transfer::Write {
                index: ASSIGNMENT_BASE_INDEX + u16::from(*sync_manager_index),
                subindex: 0,
                payload: heapless::Vec::from_slice(&[0u8]).unwrap(),
            }),
            ConfigurePass::WriteObjectEntry { desired, pos, .. } => {
                let entry = desired.get(usize::from(*pos) - 1)?;
                let raw = (u32::from(entry.index) << 16)
                    | (u32::from(entry.subindex) << 8)
                    | u32::from(entry.bit_length & 0xff);
                Some(Transfer::Write {
                    index: entry.index,
                    subindex: 1,
                    payload: heapless::Vec::from_slice(&raw.to_le_bytes()).unwrap(),
                })
            }
            ConfigurePass::WriteObjectEntryCount { desired, pos, .. } => {
                let entry = desired.get(usize::from(*pos) - 1)?;
                Some(Transfer::Write {
                    index: entry.index,
                    subindex: 0,
                    payload: heapless::Vec::from_slice(&[1u8]).unwrap(),
                })
            }
            ConfigurePass::WriteAssignmentEntry {
                sync_manager_index,
                desired,
                pos,
            } => {
                let entry = desired.get(usize::from(*pos) - 1)?;
                Some(Transfer::Write {
                    index: ASSIGNMENT_BASE_INDEX + u16::from(*sync_manager_index),
                    subindex: *pos,
                    payload: heapless::Vec::from_slice(&entry.index.to_le_bytes()).unwrap(),
                })
            }
            ConfigurePass::WriteAssignmentCount { sync_manager_index, count } => {
                Some(Transfer::Write {
                    index: ASSIGNMENT_BASE_INDEX + u16::from(*sync_manager_index),
                    subindex: 0,
                    payload: heapless::Vec::from_slice(&[*count]).unwrap(),
                })
            }
            ConfigurePass::Done | ConfigurePass::Failed => None,
        }
    }

    pub fn advance(self, outcome: Outcome<'_>) -> Self {
        if !matches!(outcome, Outcome::WriteOk) {
            return ConfigurePass::Failed;
        }

        match self {
            ConfigurePass::ClearAssignment { sync_manager_index, desired } => {
                if desired.is_empty() {
                    ConfigurePass::WriteAssignmentCount {
                        sync_manager_index,
                        count: 0,
                    }
                } else {
                    ConfigurePass::WriteObjectEntry {
                        sync_manager_index,
                        desired,
                        pos: 1,
                    }
                }
            }
            ConfigurePass::WriteObjectEntry {
                sync_manager_index,
                desired,
                pos,
            } => ConfigurePass::WriteObjectEntryCount {
                sync_manager_index,
                desired,
                pos,
            },
            ConfigurePass::WriteObjectEntryCount {
                sync_manager_index,
                desired,
                pos,
            } => ConfigurePass::WriteAssignmentEntry {
                sync_manager_index,
                desired,
                pos,
            },
            ConfigurePass::WriteAssignmentEntry {
                sync_manager_index,
                desired,
                pos,
            } => {
                if usize::from(pos) < desired.len() {
                    ConfigurePass::WriteObjectEntry {
                        sync_manager_index,
                        desired,
                        pos: pos + 1,
                    }
                } else {
                    ConfigurePass::WriteAssignmentCount {
                        sync_manager_index,
                        count: desired.len() as u8,
                    }
                }
            }
            ConfigurePass::WriteAssignmentCount { .. } => ConfigurePass::Done,
            ConfigurePass::Done | ConfigurePass::Failed => ConfigurePass::Failed,
        }
    }
}

/// Equality test for "differs": same length, same `(index, subindex, bit_length)` triples in the
/// same order.
pub fn differs(desired: &[ParameterObject], read_back: &[ParameterObject]) -> bool {
    desired.len() != read_back.len()
        || desired
            .iter()
            .zip(read_back.iter())
            .any(|(a, b)| a != b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pass_single_object_single_entry() {
        let pass = ReadPass::start(3);
        assert!(matches!(
            pass.next_transfer(),
            Some(Transfer::Read { index: 0x1c13, subindex: 0, .. })
        ));

        let pass = pass.advance(Outcome::ReadOk(&[1])); // one assigned pdo
        let pass = pass.advance(Outcome::ReadOk(&0x1a00u16.to_le_bytes())); // pdo index
        let pass = pass.advance(Outcome::ReadOk(&[1])); // one entry in the pdo
        let raw: u32 = (0x6000u32 << 16) | (1u32 << 8) | 8u32;
        let pass = pass.advance(Outcome::ReadOk(&raw.to_le_bytes()));

        match pass {
            ReadPass::Done { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0], ParameterObject { index: 0x6000, subindex: 1, bit_length: 8 });
            }
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn differs_detects_reordering() {
        let a = [
            ParameterObject { index: 0x1a00, subindex: 0, bit_length: 0 },
            ParameterObject { index: 0x1a01, subindex: 0, bit_length: 0 },
        ];
        let b = [
            ParameterObject { index: 0x1a01, subindex: 0, bit_length: 0 },
            ParameterObject { index: 0x1a00, subindex: 0, bit_length: 0 },
        ];
        assert!(differs(&a, &b));
        assert!(!differs(&a, &a));
    }

    #[test]
    fn configure_pass_writes_clear_then_entries_then_assignment() {
        let desired = heapless::Vec::<_, MAX_ASSIGNED>::from_slice(&[
            ParameterObject { index: 0x1a00, subindex: 0, bit_length: 0 },
            ParameterObject { index: 0x1a01, subindex: 0, bit_length: 0 },
        ])
        .unwrap();

        let mut pass = ConfigurePass::start(3, desired);
        let mut writes = heapless::Vec::<(u16, u8, heapless::Vec<u8, 4>), 16>::new();

        while !pass.is_terminal() {
            let Some(Transfer::Write { index, subindex, payload }) = pass.next_transfer() else {
                break;
            };
            writes.push((index, subindex, payload)).unwrap();
            pass = pass.advance(Outcome::WriteOk);
        }

        assert_eq!(writes[0].0, 0x1c13);
        assert_eq!(writes[0].1, 0);
        assert_eq!(writes[0].2.as_slice(), &[0]);

        let (last_index, last_sub, last_payload) = writes.last().unwrap();
        assert_eq!(*last_index, 0x1c13);
        assert_eq!(*last_sub, 0);
        assert_eq!(last_payload.as_slice(), &[2]);
    }

    #[test]
    fn configure_pass_terminates_and_writes_every_object_entry_for_three_pdos() {
        let desired = heapless::Vec::<_, MAX_ASSIGNED>::from_slice(&[
            ParameterObject { index: 0x1a00, subindex: 0, bit_length: 8 },
            ParameterObject { index: 0x1a01, subindex: 0, bit_length: 16 },
            ParameterObject { index: 0x1a02, subindex: 0, bit_length: 32 },
        ])
        .unwrap();

        let mut pass = ConfigurePass::start(3, desired.clone());
        let mut writes = heapless::Vec::<(u16, u8, heapless::Vec<u8, 4>), 16>::new();
        let mut steps = 0;

        while !pass.is_terminal() {
            steps += 1;
            assert!(steps <= 16, "configure pass did not terminate");

            let Some(Transfer::Write { index, subindex, payload }) = pass.next_transfer() else {
                break;
            };
            writes.push((index, subindex, payload)).unwrap();
            pass = pass.advance(Outcome::WriteOk);
        }

        assert!(matches!(pass, ConfigurePass::Done));

        // One object-entry write per PDO, each carrying that PDO's own descriptor.
        for (i, object) in desired.iter().enumerate() {
            let raw = (u32::from(object.index) << 16)
                | (u32::from(object.subindex) << 8)
                | u32::from(object.bit_length & 0xff);
            let (index, subindex, payload) = writes
                .iter()
                .find(|(index, subindex, _)| *index == object.index && *subindex == 1)
                .unwrap_or_else(|| panic!("no object-entry write found for pdo {i}"));
            assert_eq!(*index, object.index);
            assert_eq!(*subindex, 1);
            assert_eq!(payload.as_slice(), &raw.to_le_bytes());
        }

        let (last_index, last_sub, last_payload) = writes.last().unwrap();
        assert_eq!(*last_index, 0x1c13);
        assert_eq!(*last_sub, 0);
        assert_eq!(last_payload.as_slice(), &[3]);
    }
}
