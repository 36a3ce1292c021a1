//! Audio buffer: batches inbound payloads into combined chunks.
//!
//! Telephony edges deliver audio in very small frames (20 ms each). To
//! keep upstream message overhead bounded without adding noticeable
//! latency, frames accumulate here until either trigger fires: enough
//! chunks, or enough bytes. A flush emits the concatenation of everything
//! held, in arrival order, and resets the buffer.

/// Default chunk-count trigger.
pub const DEFAULT_FLUSH_MAX_CHUNKS: usize = 3;
/// Default cumulative-byte trigger.
pub const DEFAULT_FLUSH_MAX_BYTES: usize = 1024;

/// Per-call accumulator for inbound audio payloads. Payloads are opaque
/// text as received from the telephony edge; nothing here decodes them.
#[derive(Debug)]
pub struct AudioBuffer {
    chunks: Vec<String>,
    pending_bytes: usize,
    max_chunks: usize,
    max_bytes: usize,
}

impl AudioBuffer {
    pub fn new(max_chunks: usize, max_bytes: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(max_chunks.max(1)),
            pending_bytes: 0,
            max_chunks: max_chunks.max(1),
            max_bytes,
        }
    }

    /// Add one payload. Returns the combined chunk when this push fires a
    /// trigger: chunk count reached `max_chunks`, or cumulative bytes
    /// exceeded `max_bytes`. Otherwise the payload is held.
    pub fn push(&mut self, chunk: String) -> Option<String> {
        self.pending_bytes += chunk.len();
        self.chunks.push(chunk);
        if self.chunks.len() >= self.max_chunks || self.pending_bytes > self.max_bytes {
            self.flush()
        } else {
            None
        }
    }

    /// Force out whatever is held, `None` when empty. Called at stream
    /// stop so a partial batch is not abandoned.
    pub fn flush(&mut self) -> Option<String> {
        if self.chunks.is_empty() {
            return None;
        }
        let combined = self.chunks.concat();
        self.chunks.clear();
        self.pending_bytes = 0;
        Some(combined)
    }

    pub fn pending_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_MAX_CHUNKS, DEFAULT_FLUSH_MAX_BYTES)
    }
}
