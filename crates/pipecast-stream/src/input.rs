use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use pipecast_transport::{ensure_fifo, FifoWriter, TransportError, PIPE_BUF};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::InputConfig;
use crate::error::{InputError, Result};

/// Raw client message as received on the input channel.
///
/// Both fields are optional at this stage; validation happens when the
/// message is turned into an [`InputEvent`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub state: Option<StateValue>,
}

/// The `state` field of an input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Text(String),
    Flag(bool),
    Number(serde_json::Number),
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// A validated input event, ready to be written as one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    action: String,
    state: String,
}

impl InputEvent {
    /// Validate and build an event.
    pub fn new(action: impl Into<String>, state: impl Into<String>) -> std::result::Result<Self, InputError> {
        let action = action.into();
        let state = state.into();
        check_field("action", &action)?;
        check_field("state", &state)?;

        let event = Self { action, state };
        let len = event.line_len();
        if len > PIPE_BUF {
            return Err(InputError::TooLong { len, max: PIPE_BUF });
        }
        Ok(event)
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// The wire form: `action:state\n`.
    pub fn to_line(&self) -> String {
        format!("{}:{}\n", self.action, self.state)
    }

    fn line_len(&self) -> usize {
        self.action.len() + 1 + self.state.len() + 1
    }
}

impl TryFrom<InputMessage> for InputEvent {
    type Error = InputError;

    fn try_from(message: InputMessage) -> std::result::Result<Self, Self::Error> {
        let action = message.action.ok_or(InputError::MissingField("action"))?;
        let state = message.state.ok_or(InputError::MissingField("state"))?;
        Self::new(action, state.to_string())
    }
}

fn check_field(name: &'static str, value: &str) -> std::result::Result<(), InputError> {
    if value.is_empty() {
        return Err(InputError::MissingField(name));
    }
    if value.contains(['\n', '\r']) {
        return Err(InputError::LineBreak(name));
    }
    Ok(())
}

/// What happened to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The line was written to the input pipe.
    Written,
    /// The message was malformed and dropped.
    Malformed,
    /// The message was valid but could not be written.
    NotDelivered,
}

/// Relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InputStats {
    pub written: u64,
    pub malformed: u64,
    pub not_delivered: u64,
}

/// Best-effort writer of input events into the input FIFO.
///
/// Each event opens the pipe, writes one line, and closes it again. Writes
/// never block: if nobody is reading, or the pipe is full, the event is
/// dropped.
pub struct InputRelay {
    config: InputConfig,
    write_lock: Mutex<()>,
    written: AtomicU64,
    malformed: AtomicU64,
    not_delivered: AtomicU64,
}

impl InputRelay {
    /// Create the relay, making sure the input FIFO exists.
    pub fn new(config: InputConfig) -> Result<Self> {
        ensure_fifo(&config.input_pipe, config.fifo_mode)?;
        Ok(Self {
            config,
            write_lock: Mutex::new(()),
            written: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            not_delivered: AtomicU64::new(0),
        })
    }

    pub fn stats(&self) -> InputStats {
        InputStats {
            written: self.written.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            not_delivered: self.not_delivered.load(Ordering::Relaxed),
        }
    }

    /// Parse a JSON message and submit it.
    pub fn submit_json(&self, body: &[u8]) -> Delivery {
        match serde_json::from_slice::<InputMessage>(body) {
            Ok(message) => self.submit(message),
            Err(err) => self.reject(&InputError::Json(err)),
        }
    }

    /// Validate and deliver one message.
    pub fn submit(&self, message: InputMessage) -> Delivery {
        match InputEvent::try_from(message) {
            Ok(event) => self.deliver(&event),
            Err(err) => self.reject(&err),
        }
    }

    /// Write a validated event to the input pipe.
    pub fn deliver(&self, event: &InputEvent) -> Delivery {
        let line = event.to_line();
        let path = &self.config.input_pipe;

        let _writing = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let outcome = ensure_fifo(path, self.config.fifo_mode)
            .and_then(|_| FifoWriter::try_open(path))
            .and_then(|mut writer| writer.write_atomic(line.as_bytes()));

        match outcome {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
                trace!(action = event.action(), state = event.state(), "input event written");
                Delivery::Written
            }
            Err(TransportError::NoReader { .. }) => {
                self.not_delivered.fetch_add(1, Ordering::Relaxed);
                debug!(?path, action = event.action(), "no input reader; event dropped");
                Delivery::NotDelivered
            }
            Err(err) => {
                self.not_delivered.fetch_add(1, Ordering::Relaxed);
                warn!(?path, error = %err, "input event dropped");
                Delivery::NotDelivered
            }
        }
    }

    fn reject(&self, err: &InputError) -> Delivery {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        debug!(error = %err, "malformed input message dropped");
        Delivery::Malformed
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::path::PathBuf;

    use pipecast_transport::FifoReader;

    use super::*;

    fn unique_pipe(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/pipecast-input-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("input")
    }

    fn relay(path: &PathBuf) -> InputRelay {
        InputRelay::new(InputConfig {
            input_pipe: path.clone(),
            ..InputConfig::default()
        })
        .unwrap()
    }

    fn message(action: &str, state: &str) -> InputMessage {
        InputMessage {
            action: Some(action.to_string()),
            state: Some(StateValue::Text(state.to_string())),
        }
    }

    /// Open the read end, holding a writer so the blocking open returns
    /// and the reader never sees end-of-file.
    fn attach_reader(path: &PathBuf) -> (FifoReader, FifoWriter) {
        let reader_path = path.clone();
        let reader = std::thread::spawn(move || FifoReader::open(&reader_path).unwrap());
        let holder = loop {
            match FifoWriter::try_open(path) {
                Ok(writer) => break writer,
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(5)),
            }
        };
        (reader.join().unwrap(), holder)
    }

    fn read_available(reader: &mut FifoReader) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => panic!("read failed: {err}"),
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn writes_exactly_one_line_per_event() {
        let path = unique_pipe("line");
        let relay = relay(&path);

        let (mut reader, _holder) = attach_reader(&path);

        assert_eq!(relay.submit(message("up", "pressed")), Delivery::Written);
        assert_eq!(read_available(&mut reader), "up:pressed\n");
        assert_eq!(relay.stats().written, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn concurrent_submissions_never_interleave_within_a_line() {
        const WRITERS: usize = 8;
        const EVENTS: usize = 20;
        const STATE_LEN: usize = 300;

        let path = unique_pipe("concurrent");
        let relay = std::sync::Arc::new(relay(&path));
        let (mut reader, _holder) = attach_reader(&path);

        let handles: Vec<_> = (0..WRITERS)
            .map(|k| {
                let relay = relay.clone();
                std::thread::spawn(move || {
                    let state = k.to_string().repeat(STATE_LEN);
                    for _ in 0..EVENTS {
                        assert_eq!(
                            relay.submit(message(&format!("act{k}"), &state)),
                            Delivery::Written
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let text = read_available(&mut reader);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), WRITERS * EVENTS);
        assert!(text.ends_with('\n'));

        let mut per_writer = [0usize; WRITERS];
        for line in lines {
            let (action, state) = line.split_once(':').expect("line should hold one separator");
            let k: usize = action
                .strip_prefix("act")
                .and_then(|n| n.parse().ok())
                .expect("action should name its writer");
            assert_eq!(state, k.to_string().repeat(STATE_LEN));
            per_writer[k] += 1;
        }
        assert!(per_writer.iter().all(|&n| n == EVENTS));
        assert_eq!(relay.stats().written, (WRITERS * EVENTS) as u64);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn empty_or_missing_fields_are_dropped_without_writing() {
        let path = unique_pipe("empty");
        let relay = relay(&path);

        assert_eq!(relay.submit(message("", "pressed")), Delivery::Malformed);
        assert_eq!(relay.submit(message("up", "")), Delivery::Malformed);
        assert_eq!(
            relay.submit(InputMessage {
                action: Some("up".to_string()),
                state: None,
            }),
            Delivery::Malformed
        );
        assert_eq!(relay.submit_json(b"not json"), Delivery::Malformed);
        assert_eq!(relay.stats().malformed, 4);
        assert_eq!(relay.stats().written, 0);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_reader_is_not_an_error() {
        let path = unique_pipe("noreader");
        let relay = relay(&path);
        assert_eq!(relay.submit(message("fire", "down")), Delivery::NotDelivered);
        assert_eq!(relay.stats().not_delivered, 1);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn json_state_may_be_bool_or_number() {
        let message: InputMessage =
            serde_json::from_str(r#"{"action":"use","state":true}"#).unwrap();
        let event = InputEvent::try_from(message).unwrap();
        assert_eq!(event.to_line(), "use:true\n");

        let message: InputMessage =
            serde_json::from_str(r#"{"action":"turn","state":-3}"#).unwrap();
        let event = InputEvent::try_from(message).unwrap();
        assert_eq!(event.to_line(), "turn:-3\n");
    }

    #[test]
    fn line_breaks_are_rejected() {
        assert!(matches!(
            InputEvent::new("up\nfire", "pressed"),
            Err(InputError::LineBreak("action"))
        ));
        assert!(matches!(
            InputEvent::new("up", "pressed\r"),
            Err(InputError::LineBreak("state"))
        ));
    }

    #[test]
    fn oversized_lines_are_rejected() {
        let action = "a".repeat(PIPE_BUF);
        assert!(matches!(
            InputEvent::new(action, "x"),
            Err(InputError::TooLong { .. })
        ));
    }
}
