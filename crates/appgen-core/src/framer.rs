/// Splits an ordered sequence of transport chunks into SSE record payloads.
///
/// Bytes are buffered until a blank line (`\n\n`, or `\r\n\r\n`) closes a
/// record. Each closed record yields the text of its `data:` lines; records
/// without a `data:` line are dropped. The framer never fails: payload text
/// is decoded downstream.
#[derive(Debug, Default)]
pub struct StreamFramer {
    buf: Vec<u8>,
}

impl StreamFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk to the internal buffer without framing it yet.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(chunk.as_ref());
    }

    /// Returns a lazy iterator over the payloads of every complete record
    /// currently buffered, in arrival order.
    ///
    /// Records are split off one at a time as the iterator advances; anything
    /// after the last delimiter stays buffered for the next `feed`.
    pub fn drain(&mut self) -> FrameDrain<'_> {
        FrameDrain { framer: self }
    }

    /// Feeds a chunk and collects every payload it completes.
    pub fn push_chunk(&mut self, chunk: impl AsRef<[u8]>) -> Vec<String> {
        self.feed(chunk);
        self.drain().collect()
    }

    /// Number of bytes waiting for a record delimiter.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Discards any partially buffered record.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Splits off the next complete record and returns its payload.
    pub fn next_payload(&mut self) -> Option<String> {
        while let Some((idx, delim_len)) = find_record_delimiter(&self.buf) {
            let record: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(payload) = record_payload(&record) {
                return Some(payload);
            }
            tracing::trace!(len = record.len(), "dropping SSE record without data line");
        }
        None
    }
}

/// Iterator returned by [`StreamFramer::drain`].
pub struct FrameDrain<'a> {
    framer: &'a mut StreamFramer,
}

impl Iterator for FrameDrain<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_payload()
    }
}

fn find_record_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len() && &buf[i..i + 4] == b"\r\n\r\n" {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn record_payload(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(data_lines.join("\n"))
}
