//! Streaming line codec
//!
//! Bytes arrive from the socket in arbitrary chunks; the codec buffers them
//! and yields one parsed [`Request`] per complete line.

use crate::error::ParseError;
use crate::request::Request;

/// Longest request line accepted; longer lines are discarded unparsed
const MAX_LINE_LEN: usize = 1024;

/// Streaming request codec
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // An unterminated line longer than the limit can never become valid
        if self.buffer.len() > MAX_LINE_LEN && !self.buffer.contains(&b'\n') {
            tracing::warn!(
                "Discarding {} bytes of unterminated input",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    /// Extract the next complete, non-blank line without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim_end_matches('\r')
                .to_string();

            if !line.trim().is_empty() {
                return Some(line);
            }
        }
    }

    /// Extract and parse the next request
    pub fn next_request(&mut self) -> Option<Result<Request, ParseError>> {
        self.next_request_with_line().map(|(req, _)| req)
    }

    /// Extract and parse the next request along with the raw line
    ///
    /// The line is needed to echo unparseable input back in `-E` replies.
    pub fn next_request_with_line(&mut self) -> Option<(Result<Request, ParseError>, String)> {
        let line = self.next_line()?;
        let parsed = Request::parse(&line);
        if let Err(e) = &parsed {
            tracing::debug!("Failed to parse request {:?}: {}", line, e);
        }
        Some((parsed, line))
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partial_lines_are_buffered() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"GET /V1/ME");
        assert!(codec.next_request().is_none());

        codec.push_bytes(b"DIA\r\n");
        let req = codec.next_request().unwrap().unwrap();
        assert_eq!(req.path(), "/V1/MEDIA");
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"OPEN /V1\nGET /V1.*\r\n\r\nCLOSE /V1\n");

        assert!(matches!(codec.next_request(), Some(Ok(Request::Open { .. }))));
        assert!(matches!(codec.next_request(), Some(Ok(Request::GetAll { .. }))));
        assert!(matches!(codec.next_request(), Some(Ok(Request::Close { .. }))));
        assert!(codec.next_request().is_none());
    }

    #[test]
    fn test_bad_line_keeps_raw_text() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"HELLO THERE\r\n");

        let (parsed, line) = codec.next_request_with_line().unwrap();
        assert!(parsed.is_err());
        assert_eq!(line, "HELLO THERE");
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&[b'A'; MAX_LINE_LEN + 1]);
        codec.push_bytes(b"\nGET /V1\n");

        // The blank line left behind is skipped
        let req = codec.next_request().unwrap().unwrap();
        assert_eq!(req.path(), "/V1");
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_result(split in 1usize..40) {
            let input = b"CALL /V1/MEDIA/VIDEO/XP:switch(TX2:RX1)\r\n";
            let split = split.min(input.len());

            let mut codec = LineCodec::new();
            codec.push_bytes(&input[..split]);
            codec.push_bytes(&input[split..]);

            let req = codec.next_request().unwrap().unwrap();
            prop_assert_eq!(req.to_string(), "CALL /V1/MEDIA/VIDEO/XP:switch(TX2:RX1)");
        }
    }
}
