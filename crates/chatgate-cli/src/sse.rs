//! Incremental decoder for the gateway's SSE framing.

use bytes::BytesMut;

/// Collects `data:` payloads from an SSE body delivered in arbitrary pieces.
///
/// Comment lines (keep-alives) and fields other than `data` are ignored.
/// Multiple `data:` lines in one event are joined with `\n`.
#[derive(Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a piece of the body and return the payloads of completed events.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }

    /// Payload of an event left unterminated at the end of the body.
    pub fn finish(mut self) -> Option<String> {
        let rest = self.push(b"\n");
        rest.into_iter().next()
    }
}
