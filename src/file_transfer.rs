//! Chunked file transfer, layered on top of the generic acyclic file-read/file-write request
//! kind. A transfer splits into sequence-numbered chunks no larger than one acyclic payload can
//! carry, each framed with a small header so the far end (and a resuming reader) can tell where
//! it sits in the sequence. Generalizes the segmented upload a mailbox-bounded acyclic transfer
//! already has to do for any payload larger than one chunk.

use heapless::Vec;

use crate::acyclic::RequestPhase;
use crate::error::Error;
use crate::master::{Master, RequestHandle, SlaveRef};

/// Sequence number (2 bytes, little-endian) + continuation flag (1 byte).
const CHUNK_HEADER_LEN: usize = 3;

/// Largest data payload one chunk can carry within the 256-byte acyclic request ceiling.
pub const MAX_CHUNK_PAYLOAD: usize = 256 - CHUNK_HEADER_LEN;

/// Largest whole file this transfer can assemble or hold in memory at once.
pub const MAX_FILE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    InProgress,
    Done,
    Failed,
}

enum Direction {
    Read,
    Write,
}

/// Drives one chunked file transfer to completion across repeated [`FileTransfer::poll`] calls,
/// one chunk per acyclic request round-trip.
pub struct FileTransfer {
    slave: SlaveRef,
    handle: u16,
    direction: Direction,
    buffer: Vec<u8, MAX_FILE_BYTES>,
    cursor: usize,
    sequence: u16,
    current_request: Option<RequestHandle>,
    status: TransferStatus,
}

impl FileTransfer {
    /// Begin writing `data` to `handle` on `slave`.
    pub fn write(slave: SlaveRef, handle: u16, data: &[u8]) -> Result<Self, Error> {
        let mut buffer = Vec::new();
        buffer
            .extend_from_slice(data)
            .map_err(|_| Error::ResourceExhausted("file transfer exceeds buffer capacity"))?;

        Ok(Self {
            slave,
            handle,
            direction: Direction::Write,
            buffer,
            cursor: 0,
            sequence: 0,
            current_request: None,
            status: TransferStatus::InProgress,
        })
    }

    /// Begin reading `handle` on `slave` into an internal buffer.
    pub fn read(slave: SlaveRef, handle: u16) -> Self {
        Self {
            slave,
            handle,
            direction: Direction::Read,
            buffer: Vec::new(),
            cursor: 0,
            sequence: 0,
            current_request: None,
            status: TransferStatus::InProgress,
        }
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Consume this transfer, returning what was read (empty for a write transfer).
    pub fn into_data(self) -> Vec<u8, MAX_FILE_BYTES> {
        self.buffer
    }

    /// Advance this transfer by one step: issue the next chunk if none is outstanding, or
    /// harvest the outstanding one's result if it has reached a terminal phase. Call once per
    /// tick until [`FileTransfer::status`] leaves [`TransferStatus::InProgress`].
    pub fn poll<const N: usize>(&mut self, master: &mut Master<N>) -> Result<TransferStatus, Error> {
        if self.status != TransferStatus::InProgress {
            return Ok(self.status);
        }

        match self.current_request {
            None => self.issue_next_chunk(master)?,
            Some(request) => match master.request_phase(&request) {
                Some(RequestPhase::Success) => self.on_chunk_complete(master, request)?,
                Some(RequestPhase::Failed) => {
                    master.drain_completed_requests();
                    self.current_request = None;
                    self.status = TransferStatus::Failed;
                }
                Some(_) => {}
                None => self.status = TransferStatus::Failed,
            },
        }

        Ok(self.status)
    }

    fn issue_next_chunk<const N: usize>(&mut self, master: &mut Master<N>) -> Result<(), Error> {
        let request = match self.direction {
            Direction::Write => {
                let remaining = self.buffer.len() - self.cursor;
                let take = remaining.min(MAX_CHUNK_PAYLOAD);
                let more = remaining > take;

                let mut chunk: Vec<u8, 256> = Vec::new();
                let _ = chunk.extend_from_slice(&self.sequence.to_le_bytes());
                let _ = chunk.push(u8::from(more));
                let _ = chunk.extend_from_slice(&self.buffer[self.cursor..self.cursor + take]);

                self.cursor += take;
                master.issue_file_write(self.slave, self.handle, chunk)?
            }
            Direction::Read => master.issue_file_read(self.slave, self.handle)?,
        };

        self.current_request = Some(request);
        Ok(())
    }

    fn on_chunk_complete<const N: usize>(
        &mut self,
        master: &mut Master<N>,
        request: RequestHandle,
    ) -> Result<(), Error> {
        let more = match self.direction {
            Direction::Write => {
                let remaining = self.buffer.len() - self.cursor;
                remaining > 0
            }
            Direction::Read => {
                let payload = master
                    .request_payload(&request)
                    .ok_or(Error::ProtocolViolation("completed chunk has no payload"))?;

                if payload.len() < CHUNK_HEADER_LEN {
                    return Err(Error::ProtocolViolation("chunk shorter than its header"));
                }

                let sequence = u16::from_le_bytes([payload[0], payload[1]]);
                if sequence != self.sequence {
                    return Err(Error::ProtocolViolation("chunk sequence number out of order"));
                }

                let more = payload[2] != 0;
                self.buffer
                    .extend_from_slice(&payload[CHUNK_HEADER_LEN..])
                    .map_err(|_| Error::ResourceExhausted("file transfer exceeds buffer capacity"))?;
                more
            }
        };

        master.drain_completed_requests();
        self.current_request = None;
        self.sequence = self.sequence.wrapping_add(1);

        self.status = if more {
            TransferStatus::InProgress
        } else {
            TransferStatus::Done
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterConfig;
    use crate::slave::Identity;

    fn fresh_master() -> (Master<4>, SlaveRef) {
        let mut master: Master<4> = Master::new(MasterConfig::builder().interface_name("eth0").build().unwrap());
        let identity = Identity { vendor_id: 1, product_code: 2, revision: 0, serial: 0 };
        let slave = master.register_slave(0, 1, 2, identity).unwrap();
        (master, slave)
    }

    #[test]
    fn write_transfer_splits_into_chunks() {
        let (mut master, slave) = fresh_master();
        let data = [0xabu8; MAX_CHUNK_PAYLOAD + 10];
        let mut transfer = FileTransfer::write(slave, 0x1234, &data).unwrap();

        assert_eq!(transfer.poll(&mut master).unwrap(), TransferStatus::InProgress);
        assert!(transfer.current_request.is_some());
        assert_eq!(transfer.cursor, MAX_CHUNK_PAYLOAD);
    }

    #[test]
    fn small_write_is_a_single_chunk() {
        let (mut master, slave) = fresh_master();
        let mut transfer = FileTransfer::write(slave, 0x1234, &[1, 2, 3]).unwrap();

        transfer.poll(&mut master).unwrap();
        assert_eq!(transfer.cursor, 3);
    }
}
