//! Purpose: Line-oriented driver that opens sessions on one device and replays reads/writes.
//! Exports: `ShellDriver`, `ShellCommand`, `Reply`, `parse_line`.
//! Role: Host-side harness for the `shell` subcommand; one JSON reply per command line.
//! Invariants: Every session shares the device's single greeting buffer.
//! Invariants: A write never moves any session cursor.
//! Invariants: The first bad line stops the run with a `Usage` or `NotFound` error.

use std::collections::BTreeMap;
use std::io::BufRead;

use serde::Serialize;
use serde_json::Value;

use hellodev::api::{
    Device, DeviceHost, DeviceIdentity, Error, ErrorKind, Session, SessionState,
};

const DEFAULT_CAT_CHUNK: usize = 64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ShellCommand {
    Open,
    Close { session: u64 },
    Write { session: u64, name: Vec<u8> },
    Read { session: u64, want: usize },
    Cat { session: u64, chunk: usize },
    Info,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Reply {
    Open {
        session: u64,
    },
    Close {
        session: u64,
        cursor: u64,
    },
    Write {
        session: u64,
        consumed: usize,
        length: usize,
    },
    Read {
        session: u64,
        bytes: String,
        raw: Vec<u8>,
        delivered: usize,
        cursor: u64,
        state: SessionState,
    },
    Cat {
        session: u64,
        bytes: String,
        raw: Vec<u8>,
        delivered: usize,
        reads: usize,
        cursor: u64,
    },
    Info {
        device: DeviceIdentity,
        greeting: String,
        length: usize,
        sessions: usize,
    },
}

/// Parses one input line; `Ok(None)` for blank lines and comments.
///
/// Only the name of a `write` may hold arbitrary bytes; every other line must be UTF-8.
pub(crate) fn parse_line(line: &[u8]) -> Result<Option<ShellCommand>, String> {
    let mut line = line;
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    let trimmed = line.trim_ascii_start();
    if trimmed.trim_ascii_end().is_empty() || trimmed.starts_with(b"#") {
        return Ok(None);
    }

    let (verb, rest) = split_once_space(trimmed);
    if verb == b"write" {
        // Everything after the single separator space is the name, verbatim.
        let (id, name) = split_once_space(rest);
        let id = std::str::from_utf8(id).map_err(|_| "session id is not valid UTF-8".to_string())?;
        return Ok(Some(ShellCommand::Write {
            session: parse_session(id)?,
            name: name.to_vec(),
        }));
    }

    let verb = std::str::from_utf8(verb).map_err(|_| "line is not valid UTF-8".to_string())?;
    let rest = std::str::from_utf8(rest).map_err(|_| "line is not valid UTF-8".to_string())?;
    let command = match verb {
        "open" => {
            expect_no_args(verb, rest)?;
            ShellCommand::Open
        }
        "info" => {
            expect_no_args(verb, rest)?;
            ShellCommand::Info
        }
        "close" => ShellCommand::Close {
            session: parse_session(rest.trim())?,
        },
        "read" => {
            let mut args = rest.split_whitespace();
            let session = parse_session(args.next().unwrap_or_default())?;
            let want = parse_count("want", args.next())?;
            expect_no_args(verb, &args.collect::<Vec<_>>().join(" "))?;
            ShellCommand::Read { session, want }
        }
        "cat" => {
            let mut args = rest.split_whitespace();
            let session = parse_session(args.next().unwrap_or_default())?;
            let chunk = match args.next() {
                Some(value) => parse_count("chunk", Some(value))?,
                None => DEFAULT_CAT_CHUNK,
            };
            if chunk == 0 {
                return Err("chunk must be greater than zero".to_string());
            }
            expect_no_args(verb, &args.collect::<Vec<_>>().join(" "))?;
            ShellCommand::Cat { session, chunk }
        }
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Some(command))
}

fn split_once_space(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|&byte| byte == b' ') {
        Some(at) => (&bytes[..at], &bytes[at + 1..]),
        None => (bytes, &[]),
    }
}

fn expect_no_args(verb: &str, rest: &str) -> Result<(), String> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(format!("`{verb}` takes no further arguments"))
    }
}

fn parse_session(value: &str) -> Result<u64, String> {
    if value.is_empty() {
        return Err("missing session id".to_string());
    }
    value
        .parse()
        .map_err(|_| format!("invalid session id `{value}`"))
}

fn parse_count(label: &str, value: Option<&str>) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("missing {label} count"))?;
    value
        .parse()
        .map_err(|_| format!("invalid {label} count `{value}`"))
}

pub(crate) struct ShellDriver<'a, H: DeviceHost> {
    device: &'a Device<H>,
    sessions: BTreeMap<u64, Session>,
    next_id: u64,
}

impl<'a, H: DeviceHost> ShellDriver<'a, H> {
    pub(crate) fn new(device: &'a Device<H>) -> Self {
        Self {
            device,
            sessions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Executes every line of `reader`, handing each reply to `emit` as it is produced.
    pub(crate) fn run<R: BufRead>(
        &mut self,
        mut reader: R,
        mut emit: impl FnMut(&Value),
    ) -> Result<(), Error> {
        let mut line = Vec::new();
        let mut line_no = 0usize;
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read command input")
                    .with_source(err)
            })?;
            if read == 0 {
                break;
            }
            line_no += 1;
            let command = match parse_line(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("line {line_no}: {message}"))
                        .with_hint("Run `hellodev shell --help` for the command list."));
                }
            };
            let reply = self.execute(command).map_err(|err| {
                let message = err.message().unwrap_or_default().to_string();
                Error::new(err.kind()).with_message(format!("line {line_no}: {message}"))
            })?;
            let value = serde_json::to_value(&reply).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode reply")
                    .with_source(err)
            })?;
            emit(&value);
        }
        Ok(())
    }

    pub(crate) fn execute(&mut self, command: ShellCommand) -> Result<Reply, Error> {
        match command {
            ShellCommand::Open => {
                let session = self.next_id;
                self.next_id += 1;
                self.sessions.insert(session, self.device.open());
                tracing::debug!(session, "session opened");
                Ok(Reply::Open { session })
            }
            ShellCommand::Close { session } => {
                let closed = self
                    .sessions
                    .remove(&session)
                    .ok_or_else(|| unknown_session(session))?;
                tracing::debug!(session, "session closed");
                Ok(Reply::Close {
                    session,
                    cursor: closed.position(),
                })
            }
            ShellCommand::Write { session, name } => {
                let handle = self.session(session)?;
                let consumed = handle.write(&name);
                Ok(Reply::Write {
                    session,
                    consumed,
                    length: self.device.store().len(),
                })
            }
            ShellCommand::Read { session, want } => {
                let handle = self.session(session)?;
                let bytes = handle.read(want);
                Ok(Reply::Read {
                    session,
                    delivered: bytes.len(),
                    bytes: String::from_utf8_lossy(&bytes).into_owned(),
                    raw: bytes,
                    cursor: handle.position(),
                    state: handle.state(),
                })
            }
            ShellCommand::Cat { session, chunk } => {
                let handle = self.session(session)?;
                let (bytes, reads) = handle.read_to_end(chunk);
                Ok(Reply::Cat {
                    session,
                    delivered: bytes.len(),
                    bytes: String::from_utf8_lossy(&bytes).into_owned(),
                    raw: bytes,
                    reads,
                    cursor: handle.position(),
                })
            }
            ShellCommand::Info => {
                let greeting = self.device.store().snapshot();
                Ok(Reply::Info {
                    device: self.device.identity().clone(),
                    length: greeting.len(),
                    greeting: String::from_utf8_lossy(&greeting).into_owned(),
                    sessions: self.sessions.len(),
                })
            }
        }
    }

    fn session(&mut self, session: u64) -> Result<&mut Session, Error> {
        self.sessions
            .get_mut(&session)
            .ok_or_else(|| unknown_session(session))
    }
}

fn unknown_session(session: u64) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("no open session {session}"))
}
