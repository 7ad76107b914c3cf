//! Purpose: Hold top-level CLI command dispatch for `hellodev`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap; register the device and run one command.
//! Invariants: Registration failure aborts the command before any read or write.
//! Invariants: The device guard is dropped (unregistered) when the command returns.

use super::*;

use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use clap::CommandFactory;
use hellodev::api::{Device, DeviceHost, GreetingStore, LockFileHost, MemoryHost};

pub(super) fn dispatch_command(command: Command, host: HostArgs) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "hellodev", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(json!({
                "name": "hellodev",
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        command => {
            let store = Arc::new(GreetingStore::new());
            match host.lock_dir {
                Some(dir) => run_on_device(
                    Device::register(LockFileHost::new(dir), host.identity, store)?,
                    command,
                ),
                None => run_on_device(
                    Device::register(MemoryHost::new(), host.identity, store)?,
                    command,
                ),
            }
        }
    }
}

fn run_on_device<H: DeviceHost>(device: Device<H>, command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Greet { name, chunk, json } => greet(&device, name, chunk, json),
        Command::Shell { script } => {
            let mut driver = shell::ShellDriver::new(&device);
            match script {
                Some(path) => {
                    let file = File::open(&path).map_err(|err| {
                        Error::new(ErrorKind::Io)
                            .with_message("failed to open script")
                            .with_path(&path)
                            .with_source(err)
                    })?;
                    driver.run(BufReader::new(file), emit_jsonl)?;
                }
                None => driver.run(io::stdin().lock(), emit_jsonl)?,
            }
            Ok(RunOutcome::ok())
        }
        Command::Completion { .. } | Command::Version => Err(Error::new(ErrorKind::Internal)
            .with_message("command does not operate on a device")),
    }
}

fn greet<H: DeviceHost>(
    device: &Device<H>,
    name: Option<OsString>,
    chunk: usize,
    json: bool,
) -> Result<RunOutcome, Error> {
    if chunk == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--chunk must be greater than zero")
            .with_hint("Use a positive value like 64."));
    }

    let consumed = name.map(|name| device.open().write(name.as_encoded_bytes()));
    let mut reader = device.open();
    let (bytes, reads) = reader.read_to_end(chunk);
    let greeting = String::from_utf8_lossy(&bytes);

    if json {
        emit_json(json!({
            "device": device.identity(),
            "greeting": greeting,
            "length": bytes.len(),
            "consumed": consumed,
            "reads": reads,
        }));
    } else {
        println!("{greeting}");
    }
    Ok(RunOutcome::ok())
}
