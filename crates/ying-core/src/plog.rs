//! Progress logger: run a command under a pseudo-terminal, mirror its output
//! locally and relay a trimmed, escape-free copy to a chat message.

use crate::ansi::strip_ansi_codes;
use crate::relay::ChatRelay;
use crate::throttle::{RateLimitedRelay, RelayState};
use crate::{Result, YingError};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use ying_types::{DisplayMode, PipelineState};

/// Bytes requested per read from the pty.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Longest message, in characters, the relay accepts.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Clone)]
pub struct PlogOptions {
    pub mode: DisplayMode,
    pub append_cadence: Duration,
    pub replace_cadence: Duration,
    /// Send the last suppressed update once the command finishes.
    pub flush_on_exit: bool,
}

impl Default for PlogOptions {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Append,
            append_cadence: Duration::from_secs(3),
            replace_cadence: Duration::from_secs(1),
            flush_on_exit: true,
        }
    }
}

impl PlogOptions {
    /// Cadence that applies to the configured mode.
    pub fn cadence(&self) -> Duration {
        match self.mode {
            DisplayMode::Append => self.append_cadence,
            DisplayMode::Replace => self.replace_cadence,
        }
    }
}

/// Filtered output kept for relaying.
#[derive(Debug, Clone, Default)]
pub struct OutputAccumulator {
    mode: DisplayMode,
    text: String,
}

impl OutputAccumulator {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            text: String::new(),
        }
    }

    pub fn push(&mut self, chunk: &str) {
        match self.mode {
            DisplayMode::Append => self.text.push_str(chunk),
            DisplayMode::Replace => {
                self.text.clear();
                self.text.push_str(chunk);
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Drop leading characters until at most `max_chars` remain.
    pub fn keep_tail(&mut self, max_chars: usize) {
        let len = self.char_len();
        if len <= max_chars {
            return;
        }
        let skip = len - max_chars;
        let cut = self
            .text
            .char_indices()
            .nth(skip)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());
        self.text.drain(..cut);
    }
}

/// Relayed text block: header, echoed command, fenced output.
pub fn compose_message(clock: &str, banner: &str, command: &str, body: &str) -> String {
    format!(
        "`{clock} {banner}`\n$ `{command}`\n```\n{}```",
        body.trim_start()
    )
}

fn clock_now() -> String {
    chrono::Local::now().format("[%H:%M:%S]").to_string()
}

/// Per-invocation streaming state, independent of where bytes come from.
pub struct StreamPipeline<R, W> {
    command: String,
    banner: String,
    accumulator: OutputAccumulator,
    relay: RateLimitedRelay<R>,
    out: W,
    state: PipelineState,
    flush_on_exit: bool,
    pending: Option<String>,
    last_message: Option<String>,
}

impl<R: ChatRelay, W: Write> StreamPipeline<R, W> {
    pub fn new(
        command: impl Into<String>,
        banner: impl Into<String>,
        options: &PlogOptions,
        relay: RateLimitedRelay<R>,
        out: W,
    ) -> Self {
        Self {
            command: command.into(),
            banner: banner.into(),
            accumulator: OutputAccumulator::new(options.mode),
            relay,
            out,
            state: PipelineState::Running,
            flush_on_exit: options.flush_on_exit,
            pending: None,
            last_message: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn accumulator(&self) -> &OutputAccumulator {
        &self.accumulator
    }

    pub fn relay_state(&self) -> RelayState {
        self.relay.state()
    }

    pub fn relay(&self) -> &RateLimitedRelay<R> {
        &self.relay
    }

    /// Most recently composed message, whether or not it was sent.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Handle one chunk read from the command.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.feed_at(chunk, Instant::now())
    }

    pub fn feed_at(&mut self, chunk: &[u8], now: Instant) -> Result<()> {
        if let Err(e) = self.out.write_all(chunk).and_then(|()| self.out.flush()) {
            warn!(target: "ying::plog", "Failed to mirror output locally: {}", e);
        }

        let decoded = String::from_utf8_lossy(chunk);
        let filtered = strip_ansi_codes(&decoded);
        trace!(target: "ying::plog", "Filtered chunk ({} bytes): {:?}", chunk.len(), filtered);
        self.accumulator.push(&filtered);

        let text = self.compose();
        let due = self.relay.is_due(now);
        self.relay.submit_at(&text, now)?;
        self.pending = if due { None } else { Some(text.clone()) };
        self.last_message = Some(text);
        Ok(())
    }

    /// Output channel closed: send any update the cadence held back.
    pub fn finish(&mut self) -> Result<()> {
        self.state = PipelineState::Draining;
        if let Some(text) = self.pending.take() {
            if self.flush_on_exit {
                debug!(target: "ying::plog", "Flushing final update");
                self.relay.force(&text)?;
            }
        }
        Ok(())
    }

    /// The child has been reaped; nothing more will arrive.
    pub fn terminate(&mut self) {
        self.state = PipelineState::Terminated;
    }

    fn compose(&mut self) -> String {
        let clock = clock_now();
        let text = compose_message(&clock, &self.banner, &self.command, self.accumulator.as_str());
        if text.chars().count() <= MAX_MESSAGE_LEN {
            return text;
        }
        let overhead = compose_message(&clock, &self.banner, &self.command, "")
            .chars()
            .count();
        self.accumulator
            .keep_tail(MAX_MESSAGE_LEN.saturating_sub(overhead));
        compose_message(&clock, &self.banner, &self.command, self.accumulator.as_str())
    }
}

fn pty_size() -> PtySize {
    let (rows, cols) = terminal_size().unwrap_or((24, 80));
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Rows and columns of the terminal on stdout, if there is one.
#[cfg(unix)]
fn terminal_size() -> Option<(u16, u16)> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc == 0 && ws.ws_row > 0 && ws.ws_col > 0 {
        Some((ws.ws_row, ws.ws_col))
    } else {
        None
    }
}

#[cfg(not(unix))]
fn terminal_size() -> Option<(u16, u16)> {
    None
}

/// How often the read loop checks whether the child has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Blocking pty reads run on their own thread; chunks arrive over a channel.
/// The channel closes once the master reports end of stream.
fn spawn_reader(mut reader: Box<dyn Read + Send>) -> Result<Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("ying-pty-reader".into())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!(target: "ying::plog", "PTY reached end of stream");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // EIO once the child side is gone; a normal teardown.
                        debug!(target: "ying::plog", "PTY read ended: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Run `command` through `sh -c` under a pty until it exits.
///
/// Output is written verbatim to `out` and relayed through `relay`. The exit
/// status is logged only. Returns the final relay state.
pub fn run_command<R: ChatRelay, W: Write>(
    command: &str,
    options: &PlogOptions,
    relay: RateLimitedRelay<R>,
    banner: &str,
    out: W,
) -> Result<RelayState> {
    let pair = native_pty_system()
        .openpty(pty_size())
        .map_err(|e| YingError::PtyError(e.to_string()))?;

    let mut cmd = CommandBuilder::new("sh");
    cmd.args(["-c", command]);
    cmd.cwd(std::env::current_dir()?);

    info!(target: "ying::plog", "Running `{}` ({} mode)", command, options.mode);

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| YingError::ProcessSpawnFailed(e.to_string()))?;

    // The slave end stays open until the child has exited, so the master
    // cannot hang up while the tail of the output is still in flight.
    // Dropping it afterwards lets the reader drain and then see EOF.
    let mut slave = Some(pair.slave);

    let chunks = match pair
        .master
        .try_clone_reader()
        .map_err(|e| YingError::PtyError(e.to_string()))
        .and_then(spawn_reader)
    {
        Ok(chunks) => chunks,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };

    let mut pipeline = StreamPipeline::new(command, banner, options, relay, out);
    let mut exit_status = None;
    let mut outcome = Ok(());

    while pipeline.state() == PipelineState::Running {
        match chunks.recv_timeout(EXIT_POLL_INTERVAL) {
            Ok(chunk) => {
                if let Err(e) = pipeline.feed(&chunk) {
                    error!(target: "ying::plog", "Aborting `{}`: {}", command, e);
                    let _ = child.kill();
                    outcome = Err(e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if slave.is_some() {
                    if let Ok(Some(status)) = child.try_wait() {
                        debug!(target: "ying::plog", "`{}` exited, draining output", command);
                        exit_status = Some(status);
                        slave = None;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                outcome = pipeline.finish();
            }
        }
    }
    drop(slave);

    let status = match exit_status {
        Some(status) => Ok(status),
        None => child.wait(),
    };
    match status {
        Ok(status) => {
            info!(target: "ying::plog", "`{}` exited with code {}", command, status.exit_code());
        }
        Err(e) => warn!(target: "ying::plog", "Failed to wait for `{}`: {}", command, e),
    }
    pipeline.terminate();
    drop(pair.master);

    let relay_state = pipeline.relay_state();
    outcome.map(|()| relay_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use ying_types::MessageId;

    #[derive(Default)]
    struct RecordingRelay {
        sent: RefCell<Vec<String>>,
        edited: RefCell<Vec<(MessageId, String)>>,
    }

    impl ChatRelay for RecordingRelay {
        fn send_message(&self, _chat_id: &str, text: &str) -> std::result::Result<MessageId, RelayError> {
            self.sent.borrow_mut().push(text.to_string());
            Ok(MessageId(7))
        }

        fn edit_message(
            &self,
            _chat_id: &str,
            message_id: MessageId,
            text: &str,
        ) -> std::result::Result<(), RelayError> {
            self.edited.borrow_mut().push((message_id, text.to_string()));
            Ok(())
        }
    }

    fn options(mode: DisplayMode, cadence: Duration) -> PlogOptions {
        PlogOptions {
            mode,
            append_cadence: cadence,
            replace_cadence: cadence,
            flush_on_exit: true,
        }
    }

    fn pipeline<'a>(
        relay: &'a RecordingRelay,
        mode: DisplayMode,
        cadence: Duration,
    ) -> StreamPipeline<&'a RecordingRelay, Vec<u8>> {
        let opts = options(mode, cadence);
        let relay = RateLimitedRelay::new(relay, Some("-100".into()), opts.cadence());
        StreamPipeline::new("make build", "ops@box", &opts, relay, Vec::new())
    }

    fn fenced_body(message: &str) -> &str {
        let start = message.find("```\n").unwrap() + 4;
        &message[start..message.len() - 3]
    }

    #[test]
    fn test_compose_message_layout() {
        let text = compose_message("[12:00:01]", "ops@box", "ls -l", "\n  total 0\n");
        assert_eq!(text, "`[12:00:01] ops@box`\n$ `ls -l`\n```\ntotal 0\n```");
    }

    #[test]
    fn test_options_pick_cadence_by_mode() {
        let mut opts = PlogOptions::default();
        assert_eq!(opts.cadence(), Duration::from_secs(3));
        opts.mode = DisplayMode::Replace;
        assert_eq!(opts.cadence(), Duration::from_secs(1));
    }

    #[test]
    fn test_keep_tail_respects_char_boundaries() {
        let mut acc = OutputAccumulator::new(DisplayMode::Append);
        acc.push("héllo wörld");
        acc.keep_tail(5);
        assert_eq!(acc.as_str(), "wörld");
        acc.keep_tail(10);
        assert_eq!(acc.as_str(), "wörld");
        acc.keep_tail(0);
        assert_eq!(acc.as_str(), "");
    }

    #[test]
    fn test_feed_mirrors_raw_bytes_and_relays_filtered_text() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);

        p.feed(b"\x1b[32mok\x1b[0m\r\n").unwrap();

        assert_eq!(p.accumulator().as_str(), "ok\r\n");
        let sent = relay.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("ops@box`\n$ `make build`\n```\nok\r\n```"));
        drop(sent);
        assert_eq!(p.into_output(), b"\x1b[32mok\x1b[0m\r\n".to_vec());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);
        // First half of a two-byte sequence
        p.feed(b"caf\xc3").unwrap();
        assert_eq!(p.accumulator().as_str(), "caf\u{fffd}");
    }

    #[test]
    fn test_second_update_edits_same_message() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Replace, Duration::ZERO);
        p.feed(b"10%").unwrap();
        p.feed(b"20%").unwrap();

        assert_eq!(relay.sent.borrow().len(), 1);
        let edited = relay.edited.borrow();
        assert_eq!(edited.len(), 1);
        assert_eq!(edited[0].0, MessageId(7));
        assert_eq!(fenced_body(&edited[0].1), "20%");
    }

    #[test]
    fn test_throttled_update_is_flushed_on_finish() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Append, Duration::from_secs(3600));
        p.feed(b"first\n").unwrap();
        p.feed(b"second\n").unwrap();
        assert!(relay.edited.borrow().is_empty());

        p.finish().unwrap();
        assert_eq!(p.state(), PipelineState::Draining);
        let edited = relay.edited.borrow();
        assert_eq!(edited.len(), 1);
        assert_eq!(fenced_body(&edited[0].1), "first\nsecond\n");
    }

    #[test]
    fn test_terminate_after_finish() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);
        assert_eq!(p.state(), PipelineState::Running);
        p.finish().unwrap();
        p.terminate();
        assert_eq!(p.state(), PipelineState::Terminated);
    }

    #[test]
    fn test_finish_without_pending_sends_nothing() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);
        p.feed(b"done\n").unwrap();
        p.finish().unwrap();
        assert_eq!(relay.sent.borrow().len(), 1);
        assert!(relay.edited.borrow().is_empty());
    }

    #[test]
    fn test_long_output_is_truncated_to_newest_content() {
        let relay = RecordingRelay::default();
        let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);
        let mut full = String::new();
        for i in 0..500 {
            let line = format!("line {i:04}\n");
            full.push_str(&line);
            p.feed(line.as_bytes()).unwrap();
        }

        let last = p.last_message().unwrap().to_string();
        assert!(last.chars().count() <= MAX_MESSAGE_LEN);
        let body = fenced_body(&last);
        assert!(full.ends_with(body));
        assert!(body.ends_with("line 0499\n"));
        assert_eq!(p.accumulator().as_str().trim_start(), body);
    }

    fn chunk() -> impl Strategy<Value = String> {
        "[a-z0-9 \n]{1,64}"
    }

    proptest! {
        #[test]
        fn prop_append_accumulates_every_chunk(chunks in prop::collection::vec(chunk(), 1..20)) {
            let relay = RecordingRelay::default();
            let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);
            for c in &chunks {
                p.feed(c.as_bytes()).unwrap();
            }
            prop_assert_eq!(p.accumulator().as_str(), chunks.concat());
        }

        #[test]
        fn prop_replace_keeps_only_last_chunk(chunks in prop::collection::vec(chunk(), 1..20)) {
            let relay = RecordingRelay::default();
            let mut p = pipeline(&relay, DisplayMode::Replace, Duration::ZERO);
            for c in &chunks {
                p.feed(c.as_bytes()).unwrap();
                prop_assert_eq!(p.accumulator().as_str(), c.as_str());
            }
        }

        #[test]
        fn prop_truncation_keeps_fitting_suffix(sizes in prop::collection::vec(1usize..900, 1..15)) {
            let relay = RecordingRelay::default();
            let mut p = pipeline(&relay, DisplayMode::Append, Duration::ZERO);
            let overhead = compose_message("[00:00:00]", "ops@box", "make build", "").chars().count();
            let budget = MAX_MESSAGE_LEN - overhead;
            let mut full = String::new();
            for (i, size) in sizes.iter().enumerate() {
                let c: String = std::iter::repeat(char::from(b'a' + (i % 26) as u8)).take(*size).collect();
                full.push_str(&c);
                p.feed(c.as_bytes()).unwrap();
                let message = p.last_message().unwrap();
                let full_len = full.chars().count();
                if full_len > budget {
                    let tail: String = full.chars().skip(full_len - budget).collect();
                    prop_assert_eq!(message.chars().count(), MAX_MESSAGE_LEN);
                    prop_assert_eq!(p.accumulator().as_str(), tail.as_str());
                } else {
                    prop_assert!(message.chars().count() <= MAX_MESSAGE_LEN);
                    prop_assert_eq!(p.accumulator().as_str(), full.as_str());
                }
            }
        }
    }
}
