//! Snapshot framing
//!
//! TCP delivers a byte stream with no message boundaries, so every snapshot
//! on the wire is prefixed with its payload length:
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | payload: len bytes, UTF-8 |
//! +----------------+---------------------------+
//! ```
//!
//! The receiving side feeds whatever chunks the socket hands it into a
//! [`MessageFramer`], which yields each snapshot once its last byte arrives.

use crate::error::FramingError;

/// Size of the length prefix in bytes
pub const HEADER_LEN: usize = 4;

/// Default upper bound for a single snapshot payload (16 MiB)
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 16 * 1024 * 1024;

/// Full text of a document at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    text: String,
}

impl Snapshot {
    /// Capture a snapshot of the given text
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The captured document text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the snapshot, returning its text
    pub fn into_text(self) -> String {
        self.text
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Encode as a length-prefixed frame ready to be written to the stream
    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        let len = u32::try_from(self.len()).map_err(|_| FramingError::FrameTooLarge {
            len: self.len(),
            max: u32::MAX as usize,
        })?;

        let mut frame = Vec::with_capacity(HEADER_LEN + self.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(self.text.as_bytes());
        Ok(frame)
    }
}

/// Per-connection decoder turning stream chunks into snapshots
///
/// Partial frames are kept across calls to [`feed`](Self::feed). After a
/// framing error the framer is spent: it drops its buffer and yields nothing
/// further, and the owning connection is expected to close.
#[derive(Debug)]
pub struct MessageFramer {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte in `buf`
    pos: usize,
    max_len: usize,
    failed: bool,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFramer {
    /// Create a framer with the default payload limit
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_SNAPSHOT_BYTES)
    }

    /// Create a framer rejecting payloads above `max_len` bytes
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            max_len,
            failed: false,
        }
    }

    /// Append a chunk and iterate over the snapshots it completes
    ///
    /// Never blocks. Snapshots left unread in the returned iterator stay
    /// buffered and are yielded by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        if !self.failed {
            if self.pos > 0 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            self.buf.extend_from_slice(chunk);
        }
        Frames { framer: self }
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether a framing error has terminated this framer
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn next_snapshot(&mut self) -> Option<Result<Snapshot, FramingError>> {
        if self.failed {
            return None;
        }

        let pending = &self.buf[self.pos..];
        if pending.len() < HEADER_LEN {
            return None;
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&pending[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        if len > self.max_len {
            return Some(Err(self.fail(FramingError::FrameTooLarge {
                len,
                max: self.max_len,
            })));
        }

        if pending.len() < HEADER_LEN + len {
            return None;
        }

        let payload = pending[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.pos += HEADER_LEN + len;

        match String::from_utf8(payload) {
            Ok(text) => Some(Ok(Snapshot::new(text))),
            Err(e) => {
                let offset = e.utf8_error().valid_up_to();
                Some(Err(self.fail(FramingError::InvalidUtf8 { offset })))
            }
        }
    }

    fn fail(&mut self, error: FramingError) -> FramingError {
        self.failed = true;
        self.buf = Vec::new();
        self.pos = 0;
        error
    }
}

/// Snapshots completed by one [`MessageFramer::feed`] call
pub struct Frames<'a> {
    framer: &'a mut MessageFramer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Snapshot, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(texts: &[&str]) -> Vec<u8> {
        texts
            .iter()
            .flat_map(|t| Snapshot::new(*t).encode().unwrap())
            .collect()
    }

    #[test]
    fn test_encode_header() {
        let frame = Snapshot::new("héllo").encode().unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 6]);
        assert_eq!(&frame[4..], "héllo".as_bytes());
    }

    #[test]
    fn test_single_frame() {
        let mut framer = MessageFramer::new();
        let out: Vec<_> = framer.feed(&framed(&["foo\nbar"])).collect();

        assert_eq!(out, vec![Ok(Snapshot::new("foo\nbar"))]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_coalesced_frames() {
        let mut framer = MessageFramer::new();
        let out: Vec<_> = framer
            .feed(&framed(&["one", "", "three"]))
            .map(|s| s.unwrap().into_text())
            .collect();

        assert_eq!(out, vec!["one", "", "three"]);
    }

    #[test]
    fn test_split_across_every_byte() {
        let texts = ["fn main() {}", "line one\r\nline two", "ünïcödé ✓"];
        let bytes = framed(&texts);

        let mut framer = MessageFramer::new();
        let mut out = Vec::new();
        for b in &bytes {
            out.extend(framer.feed(std::slice::from_ref(b)).map(|s| s.unwrap().into_text()));
        }

        assert_eq!(out, texts);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_split_at_uneven_boundaries() {
        let texts = ["alpha", "beta gamma", "delta"];
        let bytes = framed(&texts);

        for split in [1, 3, 4, 5, 7, 9, 13, 17] {
            let mut framer = MessageFramer::new();
            let mut out = Vec::new();
            for chunk in bytes.chunks(split) {
                out.extend(framer.feed(chunk).map(|s| s.unwrap().into_text()));
            }
            assert_eq!(out, texts, "chunk size {}", split);
        }
    }

    #[test]
    fn test_partial_header_retained() {
        let bytes = framed(&["abc"]);
        let mut framer = MessageFramer::new();

        assert_eq!(framer.feed(&bytes[..2]).count(), 0);
        assert_eq!(framer.buffered(), 2);

        let out: Vec<_> = framer.feed(&bytes[2..]).collect();
        assert_eq!(out, vec![Ok(Snapshot::new("abc"))]);
    }

    #[test]
    fn test_unread_frames_survive_next_feed() {
        let mut framer = MessageFramer::new();
        let first = framer.feed(&framed(&["a", "b"])).next();
        assert_eq!(first, Some(Ok(Snapshot::new("a"))));

        let rest: Vec<_> = framer.feed(&framed(&["c"])).collect();
        assert_eq!(rest, vec![Ok(Snapshot::new("b")), Ok(Snapshot::new("c"))]);
    }

    #[test]
    fn test_oversized_frame_terminates() {
        let mut framer = MessageFramer::with_max_len(4);
        let mut frames = framer.feed(&framed(&["too long"]));

        assert_eq!(
            frames.next(),
            Some(Err(FramingError::FrameTooLarge { len: 8, max: 4 }))
        );
        assert_eq!(frames.next(), None);
        assert!(framer.is_failed());

        // Further input is ignored
        assert_eq!(framer.feed(&framed(&["ok"])).count(), 0);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = vec![0, 0, 0, 3, b'a', 0xff, b'b'];
        bytes.extend(framed(&["never seen"]));

        let mut framer = MessageFramer::new();
        let out: Vec<_> = framer.feed(&bytes).collect();

        assert_eq!(out, vec![Err(FramingError::InvalidUtf8 { offset: 1 })]);
        assert!(framer.is_failed());
    }
}
