//! A pure-Rust master for a deterministic industrial fieldbus: a single master drives a logical
//! ring of field devices, cyclically exchanging a shared process image in hard-realtime while
//! servicing acyclic parameter-object/register/file transfers over the same wire.
//!
//! The realtime path ([`cyclic::CyclicEngine::tick`]) is single-threaded and cooperative: no
//! async runtime, no blocking syscalls, one suspension step per call.

pub mod acyclic;
pub mod config;
pub mod cyclic;
pub mod device;
pub mod device_description;
pub mod device_id;
pub mod domain;
pub mod error;
pub mod file_transfer;
pub(crate) mod fmt;
pub mod gateway;
#[cfg(any(test, feature = "test-utils"))]
pub mod loopback;
pub mod master;
pub mod pool;
pub mod slave;
pub mod wire;

pub use error::Error;
pub use master::{Master, MasterHandle, MasterRegistry, SlaveRef};
