//! Implementations of the ports.
//!
//! - InMemoryTaskStore: single-process store with CAS-style locks and lock
//!   expiry. Used by the binaries and by every test.

pub mod inmem_store;

pub use self::inmem_store::InMemoryTaskStore;
