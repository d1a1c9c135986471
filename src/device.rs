//! Device abstraction over whatever NIC the host offers.
//!
//! Kept as a small trait rather than depending on any specific OS networking stack in the core.

use crate::error::Error;
use crate::wire::MAX_FRAME_LEN;

/// A raw Ethernet-like transport the cyclic engine and acyclic arbiter share.
///
/// Implementations own no bytes longer than one tick: the buffer returned by `prepare_tx` is
/// only valid until the next call to `prepare_tx`, and the buffer returned by `received` is only
/// valid until the next call to `poll`.
pub trait Device {
    /// Borrow a transmit buffer at least `len` bytes long.
    fn prepare_tx(&mut self, len: usize) -> Result<&mut [u8], Error>;

    /// Send the first `len` bytes prepared by `prepare_tx`.
    fn transmit(&mut self, len: usize) -> Result<(), Error>;

    /// Cooperatively drive the receive path. Re-entrant safe against the device's own interrupt
    /// handler (or, on a hosted OS, its own read-readiness notification).
    fn poll(&mut self) -> Result<(), Error>;

    /// Take a frame that arrived since the last `poll`, if any.
    fn received(&mut self) -> Option<&[u8]>;
}

/// A [`Device`] backed by [`pnet_datalink`]'s cross-platform raw-Ethernet channel.
pub struct DatalinkDevice {
    tx_buf: [u8; MAX_FRAME_LEN],
    rx_buf: [u8; MAX_FRAME_LEN],
    rx_len: Option<usize>,
    tx: Box<dyn pnet_datalink::DataLinkSender>,
    rx: Box<dyn pnet_datalink::DataLinkReceiver>,
}

impl DatalinkDevice {
    /// Open a raw-Ethernet channel on the named network interface.
    pub fn open(interface_name: &str) -> Result<Self, Error> {
        let interface = pnet_datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or(Error::InvalidArgument("no such network interface"))?;

        let config = pnet_datalink::Config::default();

        let channel = pnet_datalink::channel(&interface, config)
            .map_err(|_| Error::LinkDown)?;

        let (tx, rx) = match channel {
            pnet_datalink::Channel::Ethernet(tx, rx) => (tx, rx),
            _ => return Err(Error::LinkDown),
        };

        Ok(Self {
            tx_buf: [0u8; MAX_FRAME_LEN],
            rx_buf: [0u8; MAX_FRAME_LEN],
            rx_len: None,
            tx,
            rx,
        })
    }
}

impl Device for DatalinkDevice {
    fn prepare_tx(&mut self, len: usize) -> Result<&mut [u8], Error> {
        self.tx_buf
            .get_mut(..len)
            .ok_or(Error::ResourceExhausted("transmit buffer too small"))
    }

    fn transmit(&mut self, len: usize) -> Result<(), Error> {
        let frame = &self.tx_buf[..len];

        match self.tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            _ => Err(Error::LinkDown),
        }
    }

    fn poll(&mut self) -> Result<(), Error> {
        match self.rx.next() {
            Ok(frame) => {
                let len = frame.len().min(MAX_FRAME_LEN);
                self.rx_buf[..len].copy_from_slice(&frame[..len]);
                self.rx_len = Some(len);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                self.rx_len = None;
                Ok(())
            }
            Err(_) => Err(Error::LinkDown),
        }
    }

    fn received(&mut self) -> Option<&[u8]> {
        self.rx_len.map(|len| &self.rx_buf[..len])
    }
}
