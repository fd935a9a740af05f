//! Stream framing: encode typed events as discrete SSE-style frames and
//! decode them incrementally on the receiving side.
//!
//! ## Wire Format
//!
//! ```text
//! event: chunk
//! data: {"type":"chunk","text":"ARR grew "}
//!
//! ```
//!
//! Each frame is independently parseable; the decoder holds partial input
//! between pushes so the receiver never blocks on the whole payload.
//! Unknown or unparseable frames are logged and skipped without
//! terminating the stream (forward compatibility).

use bytes::Bytes;
use tracing::warn;

use dealroom_core::{Result, StreamEvent};

/// Encode one event as a self-delimiting frame.
pub fn encode_frame(event: &StreamEvent) -> Result<Bytes> {
    let data = serde_json::to_string(event)?;
    Ok(Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        event.event_name(),
        data
    )))
}

/// Incremental frame decoder.
///
/// Feed arbitrary byte slices with [`FrameDecoder::push`]; complete frames
/// are returned in emission order, partial input is buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume bytes, returning every event completed by this push.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(pos) = self.buf.find("\n\n") {
            let frame: String = self.buf.drain(..pos + 2).collect();
            if let Some(event) = Self::parse_frame(frame.trim_end_matches('\n')) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes currently buffered waiting for a frame terminator.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    fn parse_frame(frame: &str) -> Option<StreamEvent> {
        let mut data: Option<&str> = None;
        for line in frame.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(v) = line.strip_prefix("data: ") {
                data = Some(v);
            }
            // `event:` lines are advisory; the JSON tag is authoritative
        }

        let data = data?;
        match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, frame = %data, "Skipping unparseable frame");
                None
            }
        }
    }
}
