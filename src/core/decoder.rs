/// Stateful UTF-8 decoder that carries partial code points across chunk
/// boundaries.
///
/// A PTY reader delivers byte chunks at arbitrary boundaries; a multi-byte
/// UTF-8 character can straddle two chunks. Decoding each chunk independently
/// with `String::from_utf8_lossy` would replace the split sequence with
/// U+FFFD on both sides. This decoder buffers the incomplete trailing bytes
/// and prepends them to the next chunk instead. Genuinely invalid bytes (not
/// just incomplete ones) are replaced, never fatal — decoding lenience is a
/// protocol requirement (§4.E), not just a convenience.
pub struct Utf8IncrementalDecoder {
    /// Bytes making up an incomplete trailing sequence from the last call
    /// (at most 3 bytes — a 4-byte sequence is never incomplete past 3).
    pending: Vec<u8>,
}

impl Default for Utf8IncrementalDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8IncrementalDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(4),
        }
    }

    /// Decodes `input`, returning a valid `String`. Any trailing incomplete
    /// sequence is retained internally for the next call.
    pub fn decode(&mut self, input: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(input);

        let mut out = String::with_capacity(data.len());
        let mut rest = &data[..];

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    // Safety: `valid_up_to` is guaranteed valid UTF-8 by str::from_utf8.
                    out.push_str(std::str::from_utf8(&rest[..valid_up_to]).unwrap());

                    match e.error_len() {
                        None => {
                            // Incomplete sequence at the end of `rest` — buffer it
                            // for the next chunk and stop.
                            self.pending = rest[valid_up_to..].to_vec();
                            rest = &[];
                            break;
                        }
                        Some(bad_len) => {
                            // Genuinely malformed bytes: replace and skip past them.
                            out.push('\u{FFFD}');
                            rest = &rest[valid_up_to + bad_len..];
                        }
                    }
                }
            }
        }

        out
    }
}
