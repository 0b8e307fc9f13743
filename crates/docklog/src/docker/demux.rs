//! Multiplexed-frame demuxer.
//!
//! Non-TTY container log streams prefix every frame with an 8-byte header
//! `[stream:1][0:3][len:4_be]` where the first byte is 0 (stdin), 1 (stdout)
//! or 2 (stderr). The demuxer strips the 8-byte prefix wherever it observes
//! one at the current chunk offset and passes payload bytes through
//! unchanged; the length word is advisory and ignored.
//!
//! Header detection is a lossy heuristic inherited from the log protocol:
//! a payload byte in `{0,1,2}` with eight bytes left in the chunk is
//! indistinguishable from a header and will be over-stripped.

use bytes::Bytes;

/// Strip stream-type headers from one chunk of a multiplexed log stream.
pub fn strip_frame_headers(chunk: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(chunk.len());
    let mut i = 0;
    while i < chunk.len() {
        if chunk[i] <= 2 && i + 8 <= chunk.len() {
            i += 8;
        } else {
            payload.push(chunk[i]);
            i += 1;
        }
    }
    Bytes::from(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_single_stdout_frame() {
        let chunk = frame(1, b"hello world\n");
        assert_eq!(strip_frame_headers(&chunk), "hello world\n");
    }

    #[test]
    fn test_stderr_frame() {
        let chunk = frame(2, b"oops\n");
        assert_eq!(strip_frame_headers(&chunk), "oops\n");
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut chunk = frame(1, b"first\n");
        chunk.extend(frame(2, b"second\n"));
        chunk.extend(frame(1, b"third\n"));
        assert_eq!(strip_frame_headers(&chunk), "first\nsecond\nthird\n");
    }

    #[test]
    fn test_plain_chunk_passes_through() {
        let chunk = b"no headers here, just text\n";
        assert_eq!(strip_frame_headers(chunk), &chunk[..]);
    }

    #[test]
    fn test_low_byte_near_chunk_end_is_kept() {
        // Fewer than 8 bytes remain, so this cannot be a header.
        let chunk = [b'a', b'b', 1, 2, 0];
        assert_eq!(strip_frame_headers(&chunk), &[b'a', b'b', 1, 2, 0][..]);
    }

    #[test]
    fn test_empty_chunk() {
        assert!(strip_frame_headers(&[]).is_empty());
    }
}
