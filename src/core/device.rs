// Device identity, entry-point capability, per-open sessions, and the registration guard.
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::error::Error;
use crate::core::greeting::GreetingStore;
use crate::core::transfer::{Sink, Source};

pub const DEFAULT_DEVICE_NAME: &str = "hello";
pub const DEFAULT_MAJOR: u32 = 300;
pub const DEFAULT_MINOR: u32 = 0;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct DeviceIdentity {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
        }
    }

    pub fn number(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_NAME, DEFAULT_MAJOR, DEFAULT_MINOR)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.major, self.minor)
    }
}

/// Read/write entry points a host binds to a device number.
pub trait FileOps: Send + Sync {
    /// Delivers up to `want` bytes from `*pos` into `sink`; advances `*pos`.
    fn on_read(&self, pos: &mut u64, want: usize, sink: &mut dyn Sink) -> usize;

    /// Consumes bytes from `source`. `pos` is the caller's file position.
    fn on_write(&self, source: &dyn Source, pos: &mut u64) -> usize;

    /// Current logical size of the readable stream.
    fn size(&self) -> u64;
}

impl FileOps for GreetingStore {
    fn on_read(&self, pos: &mut u64, want: usize, sink: &mut dyn Sink) -> usize {
        self.read(pos, want, sink)
    }

    // The write path always targets the name slot; the position is neither
    // consulted nor advanced.
    fn on_write(&self, source: &dyn Source, _pos: &mut u64) -> usize {
        self.write(source)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Streaming,
    Done,
}

/// One open of the device: shared ops plus a private cursor.
pub struct Session {
    ops: Arc<dyn FileOps>,
    pos: u64,
}

impl Session {
    pub fn new(ops: Arc<dyn FileOps>) -> Self {
        Self { ops, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn state(&self) -> SessionState {
        if self.pos < self.ops.size() {
            SessionState::Streaming
        } else {
            SessionState::Done
        }
    }

    pub fn read(&mut self, want: usize) -> Vec<u8> {
        let mut out = Vec::new();
        self.ops.on_read(&mut self.pos, want, &mut out);
        out
    }

    pub fn read_into(&mut self, want: usize, sink: &mut dyn Sink) -> usize {
        self.ops.on_read(&mut self.pos, want, sink)
    }

    /// Reads in `chunk`-sized calls until a call delivers nothing.
    pub fn read_to_end(&mut self, chunk: usize) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut calls = 0;
        if chunk == 0 {
            return (out, calls);
        }
        loop {
            calls += 1;
            if self.ops.on_read(&mut self.pos, chunk, &mut out) == 0 {
                return (out, calls);
            }
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.ops.on_write(&bytes, &mut self.pos)
    }

    pub fn write_from(&mut self, source: &dyn Source) -> usize {
        self.ops.on_write(source, &mut self.pos)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("pos", &self.pos).finish()
    }
}

/// Lifecycle hooks of the environment a device is published into.
pub trait DeviceHost {
    type Handle;

    fn register(
        &self,
        identity: &DeviceIdentity,
        ops: Arc<dyn FileOps>,
    ) -> Result<Self::Handle, Error>;
    fn unregister(&self, handle: Self::Handle);
}

/// A registered greeting device; unregisters on drop.
pub struct Device<H: DeviceHost> {
    identity: DeviceIdentity,
    store: Arc<GreetingStore>,
    host: H,
    handle: Option<H::Handle>,
}

impl<H: DeviceHost> Device<H> {
    pub fn register(
        host: H,
        identity: DeviceIdentity,
        store: Arc<GreetingStore>,
    ) -> Result<Self, Error> {
        let ops: Arc<dyn FileOps> = store.clone();
        let handle = match host.register(&identity, ops) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(device = %identity, error = %err, "device registration failed");
                return Err(err.with_identity(&identity));
            }
        };
        tracing::info!(device = %identity, "device registered");
        Ok(Self {
            identity,
            store,
            host,
            handle: Some(handle),
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<GreetingStore> {
        &self.store
    }

    pub fn open(&self) -> Session {
        Session::new(self.store.clone())
    }

    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.host.unregister(handle);
            tracing::info!(device = %self.identity, "device unregistered");
        }
    }
}

impl<H: DeviceHost> Drop for Device<H> {
    fn drop(&mut self) {
        self.release();
    }
}
