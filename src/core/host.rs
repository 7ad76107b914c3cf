// Hosts that publish a device number: an in-process table and a cross-process lock file.
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use libc::{EACCES, EPERM};

use crate::core::device::{DeviceHost, DeviceIdentity, FileOps, Session};
use crate::core::error::{Error, ErrorKind};

type DeviceTable = HashMap<(u32, u32), (DeviceIdentity, Arc<dyn FileOps>)>;

/// Device table living inside the current process.
#[derive(Clone, Default)]
pub struct MemoryHost {
    devices: Arc<Mutex<DeviceTable>>,
}

#[derive(Debug)]
pub struct MemoryHandle {
    number: (u32, u32),
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh session on whatever is registered at `major:minor`.
    pub fn open(&self, major: u32, minor: u32) -> Result<Session, Error> {
        let devices = self.table();
        let (_, ops) = devices.get(&(major, minor)).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("no device registered at {major}:{minor}"))
        })?;
        Ok(Session::new(ops.clone()))
    }

    pub fn registered(&self) -> Vec<DeviceIdentity> {
        let mut identities = self
            .table()
            .values()
            .map(|(identity, _)| identity.clone())
            .collect::<Vec<_>>();
        identities.sort_by_key(DeviceIdentity::number);
        identities
    }

    fn table(&self) -> MutexGuard<'_, DeviceTable> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceHost for MemoryHost {
    type Handle = MemoryHandle;

    fn register(
        &self,
        identity: &DeviceIdentity,
        ops: Arc<dyn FileOps>,
    ) -> Result<MemoryHandle, Error> {
        let number = identity.number();
        let mut devices = self.table();
        if let Some((owner, _)) = devices.get(&number) {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("device number already taken by {}", owner.name)));
        }
        devices.insert(number, (identity.clone(), ops));
        Ok(MemoryHandle { number })
    }

    fn unregister(&self, handle: MemoryHandle) {
        self.table().remove(&handle.number);
    }
}

/// Claims device numbers across processes with one locked file per number.
#[derive(Clone, Debug)]
pub struct LockFileHost {
    dir: PathBuf,
}

#[derive(Debug)]
pub struct LockFileHandle {
    file: File,
    path: PathBuf,
}

impl LockFileHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self, identity: &DeviceIdentity) -> PathBuf {
        self.dir.join(format!("{}-{}.lock", identity.major, identity.minor))
    }
}

impl DeviceHost for LockFileHost {
    type Handle = LockFileHandle;

    fn register(
        &self,
        identity: &DeviceIdentity,
        _ops: Arc<dyn FileOps>,
    ) -> Result<LockFileHandle, Error> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create lock directory")
                .with_path(&self.dir)
                .with_source(err)
        })?;

        let path = self.lock_path(identity);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        file.try_lock_exclusive().map_err(|err| {
            let kind = match lock_error_kind(&err) {
                ErrorKind::Busy => ErrorKind::AlreadyExists,
                kind => kind,
            };
            let err = Error::new(kind).with_path(&path).with_source(err);
            if kind == ErrorKind::AlreadyExists {
                err.with_message("device number is registered by another process")
                    .with_hint("Unregister the other device or pick a different --major/--minor.")
            } else {
                err.with_message("failed to lock device number")
            }
        })?;

        let owner = format!("{}\n", identity.name);
        file.set_len(0)
            .and_then(|_| file.write_all(owner.as_bytes()))
            .and_then(|_| file.flush())
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        Ok(LockFileHandle { file, path })
    }

    // The lock file outlives the registration: every claimant must contend on
    // the same inode, so it is unlocked but never unlinked.
    fn unregister(&self, handle: LockFileHandle) {
        if let Err(err) = handle.file.unlock() {
            tracing::debug!(path = %handle.path.display(), error = %err, "device unlock failed");
        }
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
        return ErrorKind::Busy;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::{LockFileHost, MemoryHost, lock_error_kind};
    use crate::core::device::{Device, DeviceIdentity};
    use crate::core::error::ErrorKind;
    use crate::core::greeting::GreetingStore;
    use fs2::FileExt;
    use std::fs::OpenOptions;
    use std::sync::Arc;

    #[test]
    fn memory_host_rejects_taken_number() {
        let host = MemoryHost::new();
        let _first = Device::register(
            host.clone(),
            DeviceIdentity::default(),
            Arc::new(GreetingStore::new()),
        )
        .expect("register");

        let result = Device::register(
            host.clone(),
            DeviceIdentity::new("other", 300, 0),
            Arc::new(GreetingStore::new()),
        );
        match result {
            Ok(_) => panic!("expected already-exists error"),
            Err(err) => assert_eq!(err.kind(), ErrorKind::AlreadyExists),
        }
        assert_eq!(host.registered(), vec![DeviceIdentity::default()]);
    }

    #[test]
    fn memory_host_opens_sessions_on_shared_store() {
        let host = MemoryHost::new();
        let device = Device::register(
            host.clone(),
            DeviceIdentity::default(),
            Arc::new(GreetingStore::new()),
        )
        .expect("register");

        let mut writer = host.open(300, 0).expect("open writer");
        let mut reader = host.open(300, 0).expect("open reader");
        writer.write(b"Bari");
        assert_eq!(reader.read(64), b"Hello, Bari!");
        assert_eq!(device.store().len(), 12);

        drop(device);
        let err = host.open(300, 0).expect_err("unregistered");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(host.registered().is_empty());
    }

    #[test]
    fn memory_host_reuses_number_after_unregister() {
        let host = MemoryHost::new();
        let store = Arc::new(GreetingStore::new());
        let first = Device::register(host.clone(), DeviceIdentity::default(), store.clone())
            .expect("register");
        first.unregister();
        Device::register(host, DeviceIdentity::default(), store).expect("register again");
    }

    #[test]
    fn lock_file_host_claims_number_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = LockFileHost::new(dir.path().join("devices"));
        let identity = DeviceIdentity::default();

        let store = Arc::new(GreetingStore::new());
        let device =
            Device::register(host.clone(), identity.clone(), store.clone()).expect("register");
        let path = host.lock_path(&identity);
        assert_eq!(std::fs::read_to_string(&path).expect("owner"), "hello\n");

        let result = Device::register(host.clone(), identity.clone(), store.clone());
        match result {
            Ok(_) => panic!("expected already-exists error"),
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::AlreadyExists);
                assert_eq!(err.path(), Some(path.as_path()));
            }
        }

        device.unregister();
        assert!(path.exists());
        Device::register(host, identity, store).expect("register again");
    }

    #[test]
    fn early_opener_and_late_claimant_cannot_both_own_number() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = LockFileHost::new(dir.path().join("devices"));
        let identity = DeviceIdentity::default();
        let store = Arc::new(GreetingStore::new());

        let first =
            Device::register(host.clone(), identity.clone(), store.clone()).expect("register");
        let waiting = OpenOptions::new()
            .read(true)
            .write(true)
            .open(host.lock_path(&identity))
            .expect("open lock file");

        first.unregister();
        waiting.try_lock_exclusive().expect("lock released number");

        match Device::register(host.clone(), identity.clone(), store.clone()) {
            Ok(_) => panic!("number claimed twice"),
            Err(err) => assert_eq!(err.kind(), ErrorKind::AlreadyExists),
        }
        waiting.unlock().expect("unlock");
        Device::register(host, identity, store).expect("register after release");
    }

    #[test]
    fn lock_errors_map_to_expected_kinds() {
        let err = std::io::Error::from_raw_os_error(libc::EAGAIN);
        assert_eq!(lock_error_kind(&err), ErrorKind::Busy);

        let err = std::io::Error::from_raw_os_error(libc::EWOULDBLOCK);
        assert_eq!(lock_error_kind(&err), ErrorKind::Busy);

        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(lock_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(lock_error_kind(&err), ErrorKind::Permission);

        let err = std::io::Error::from_raw_os_error(libc::EBADF);
        assert_eq!(lock_error_kind(&err), ErrorKind::Io);
    }
}
