//! An in-memory loopback [`Device`], for exercising the cyclic engine and acyclic arbiter
//! without a real NIC. Available to the crate's own tests and, behind the `test-utils` feature,
//! to downstream integration tests.

use crate::device::Device;
use crate::error::Error;
use crate::wire::MAX_FRAME_LEN;

pub struct LoopbackDevice {
    tx_buf: [u8; MAX_FRAME_LEN],
    pending: Option<(usize, usize)>,
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self {
            tx_buf: [0u8; MAX_FRAME_LEN],
            pending: None,
        }
    }
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for LoopbackDevice {
    fn prepare_tx(&mut self, len: usize) -> Result<&mut [u8], Error> {
        self.tx_buf
            .get_mut(..len)
            .ok_or(Error::ResourceExhausted("transmit buffer too small"))
    }

    fn transmit(&mut self, len: usize) -> Result<(), Error> {
        self.pending = Some((0, len));
        Ok(())
    }

    fn poll(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn received(&mut self) -> Option<&[u8]> {
        let (offset, len) = self.pending.take()?;
        Some(&self.tx_buf[offset..offset + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_echoes_transmitted_bytes() {
        let mut dev = LoopbackDevice::new();
        {
            let buf = dev.prepare_tx(4).unwrap();
            buf.copy_from_slice(&[1, 2, 3, 4]);
        }
        dev.transmit(4).unwrap();
        dev.poll().unwrap();

        assert_eq!(dev.received(), Some(&[1, 2, 3, 4][..]));
        assert_eq!(dev.received(), None);
    }
}
