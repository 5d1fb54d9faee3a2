//! Newline framing over a response byte stream.
//!
//! Both backends stream line-oriented bodies (SSE for OpenAI, NDJSON for
//! Ollama). Network chunks can split a line, or a multi-byte character, at
//! any point, so bytes are buffered until a full line is available.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;

use super::error::LLMError;

pub(crate) struct LineStream<S> {
    inner: S,
    buffer: BytesMut,
    done: bool,
}

impl<S> LineStream<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            done: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line = self.buffer.split_to(end + 1);
        Some(decode(&line[..end]))
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

impl<S, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<LLMError>,
{
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.take_line() {
                return Poll::Ready(Some(Ok(line)));
            }

            if self.done {
                if self.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                // Last line without a trailing newline
                let rest = self.buffer.split();
                return Poll::Ready(Some(Ok(decode(&rest))));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    self.buffer.clear();
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => self.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
