//! Per-client connection state: receive buffer, line framer, and the
//! optional monitor subscription (spec §3 "Connection state", §4.5).

use mio::net::TcpStream;

/// A connection's monitor subscription. The target PV is stored by name,
/// not by handle, because subscribing never validates the name (spec §7 —
/// "the subscribe itself always succeeds"; a bad name just produces silent
/// no-op emits at resolution time).
#[derive(Debug, Clone)]
pub struct Monitor {
    pub pv_name: String,
    pub interval_ms: u64,
    pub last_emit_ms: u64,
}

pub struct Connection {
    pub stream: TcpStream,
    buf: Vec<u8>,
    cap: usize,
    pub monitor: Option<Monitor>,
}

impl Connection {
    pub fn new(stream: TcpStream, cap: usize) -> Self {
        Self {
            stream,
            buf: Vec::with_capacity(cap),
            cap,
            monitor: None,
        }
    }

    /// Appends freshly-read bytes, silently dropping anything past the
    /// buffer's fixed capacity (a client that never sends `\n` within one
    /// buffer's worth of bytes is misbehaving; the source has the same
    /// fixed `BEAMLINE_CMD_BUFFER_SIZE` ceiling).
    pub fn feed(&mut self, data: &[u8]) {
        let room = self.cap.saturating_sub(self.buf.len());
        let take = room.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
    }

    /// Extracts and removes the next complete `\n`-terminated line, if any.
    /// The trailing `\n` (and a preceding `\r`, if present) is stripped;
    /// the remainder of the buffer is shifted to the front (spec §4.5).
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line_bytes = self.buf.drain(..=newline).collect::<Vec<u8>>();
        line_bytes.pop(); // drop '\n'
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        Some(String::from_utf8_lossy(&line_bytes).into_owned())
    }
}
