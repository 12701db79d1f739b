use std::io::Write;

use serde::Serialize;

/// The four outbound event shapes defined in §4.I, each serialized as a
/// single newline-terminated JSON object.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "created")]
    Created { id: u32 },
    #[serde(rename = "output")]
    Output { id: u32, data: String },
    #[serde(rename = "output-written")]
    OutputWritten { id: u32, chars: u32 },
    #[serde(rename = "closed")]
    Closed { id: u32 },
}

/// Serializes events to the controller channel, one per line, flushed
/// immediately so the controller never waits behind this process's stdio
/// buffering (§4.I, §6).
pub struct EventEmitter<W: Write> {
    out: W,
}

impl<W: Write> EventEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn created(&mut self, id: u32) {
        self.emit(&Event::Created { id });
    }

    pub fn output(&mut self, id: u32, data: String) {
        self.emit(&Event::Output { id, data });
    }

    pub fn output_written(&mut self, id: u32, chars: u32) {
        self.emit(&Event::OutputWritten { id, chars });
    }

    pub fn closed(&mut self, id: u32) {
        self.emit(&Event::Closed { id });
    }

    fn emit(&mut self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                log::error!("failed to serialize event: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{line}") {
            log::error!("failed to write event: {e}");
            return;
        }
        if let Err(e) = self.out.flush() {
            log::error!("failed to flush event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_to_one_line_each_with_the_documented_fields() {
        let mut buf = Vec::new();
        {
            let mut emitter = EventEmitter::new(&mut buf);
            emitter.created(1);
            emitter.output(1, "hi\n".to_string());
            emitter.output_written(1, 2);
            emitter.closed(1);
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"type":"created","id":1}"#);
        assert_eq!(lines[1], r#"{"type":"output","id":1,"data":"hi\n"}"#);
        assert_eq!(lines[2], r#"{"type":"output-written","id":1,"chars":2}"#);
        assert_eq!(lines[3], r#"{"type":"closed","id":1}"#);
    }
}
