//! Purpose: Define the public Rust API boundary for hellodev.
//! Exports: Greeting store, session, host, and error types used by the CLI and tests.
//! Role: Additive-only surface over the `core` modules.
//! Invariants: Buffer constants are exported so callers never hardcode them.

pub use crate::core::device::{
    DEFAULT_DEVICE_NAME, DEFAULT_MAJOR, DEFAULT_MINOR, Device, DeviceHost, DeviceIdentity,
    FileOps, Session, SessionState,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::greeting::{GREETING_CAPACITY, GreetingStore, MAX_NAME_LEN, PREFIX_LEN};
pub use crate::core::host::{LockFileHandle, LockFileHost, MemoryHandle, MemoryHost};
pub use crate::core::transfer::{PartialSink, PartialSource, Sink, Source};
