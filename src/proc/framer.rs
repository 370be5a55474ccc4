/// Marker the worker prints on its own line after finishing one
/// command's reply. The framing protocol assumes it never appears
/// inside a payload, which holds because the worker itself reserves it.
pub const READY_SENTINEL: &[u8] = b"{ready}";

/// Accumulate-until-sentinel state machine over the worker's output
/// bytes.
///
/// Feed it whatever chunks the stream hands you; it emits one frame
/// (the bytes preceding the sentinel line) per completed reply, in
/// order. Independent of any I/O mechanism, so it is testable with
/// plain byte slices.
#[derive(Debug, Default)]
pub struct ReplyFramer {
    buffer: Vec<u8>,
}

impl ReplyFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and drains every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some((start, end)) = self.find_sentinel_line() {
            let mut frame: Vec<u8> = self.buffer.drain(..end).collect();
            frame.truncate(start);
            frames.push(frame);
        }
        frames
    }

    /// Locates a sentinel sitting on its own completed line. Returns
    /// the sentinel's start index and the index just past its line
    /// terminator.
    fn find_sentinel_line(&self) -> Option<(usize, usize)> {
        let buf = &self.buffer;
        let mut from = 0;
        while from + READY_SENTINEL.len() <= buf.len() {
            let Some(at) = find(&buf[from..], READY_SENTINEL).map(|i| i + from) else {
                return None;
            };
            let at_line_start = at == 0 || buf[at - 1] == b'\n';
            let rest = &buf[at + READY_SENTINEL.len()..];
            let line_end = if rest.starts_with(b"\r\n") {
                Some(at + READY_SENTINEL.len() + 2)
            } else if rest.starts_with(b"\n") {
                Some(at + READY_SENTINEL.len() + 1)
            } else {
                // Sentinel not yet followed by its newline; wait for
                // more bytes unless a later occurrence qualifies.
                None
            };
            if at_line_start {
                if let Some(end) = line_end {
                    return Some((at, end));
                }
            }
            from = at + 1;
        }
        None
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_chunks_complete_one_frame() {
        let mut framer = ReplyFramer::new();
        assert!(framer.push(b"[{\"SourceFile\"").is_empty());
        assert!(framer.push(b": \"a.jpg\"}]\n{rea").is_empty());
        let frames = framer.push(b"dy}\n");
        assert_eq!(frames, vec![b"[{\"SourceFile\": \"a.jpg\"}]\n".to_vec()]);
    }

    #[test]
    fn coalesced_replies_split_in_order() {
        let mut framer = ReplyFramer::new();
        let frames = framer.push(b"first\n{ready}\nsecond\n{ready}\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"first\n");
        assert_eq!(frames[1], b"second\n");
    }

    #[test]
    fn sentinel_without_newline_waits() {
        let mut framer = ReplyFramer::new();
        assert!(framer.push(b"payload\n{ready}").is_empty());
        let frames = framer.push(b"\n");
        assert_eq!(frames, vec![b"payload\n".to_vec()]);
    }

    #[test]
    fn sentinel_inside_a_line_is_payload() {
        let mut framer = ReplyFramer::new();
        let frames = framer.push(b"note: {ready} is the marker\n{ready}\n");
        assert_eq!(frames, vec![b"note: {ready} is the marker\n".to_vec()]);
    }

    #[test]
    fn empty_reply_frames_as_empty() {
        let mut framer = ReplyFramer::new();
        let frames = framer.push(b"{ready}\n");
        assert_eq!(frames, vec![Vec::<u8>::new()]);
    }
}
