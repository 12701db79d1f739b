use std::collections::HashMap;
use std::sync::Arc;

use super::activity::ActivitySignal;
use super::decoder::Utf8IncrementalDecoder;
use super::error::PtyError;
use super::platform::{self, PtyHandle};
use super::reader::NonblockingByteReader;
use super::writer::NonblockingWriter;

/// One PTY plus its attached child process, as seen by the server: the
/// platform handle used for resize/terminate/liveness, the reader/writer
/// pair driving its I/O, and the decoder that turns its raw bytes into
/// well-formed text (§4.F).
pub struct PtySession {
    id: u32,
    handle: PtyHandle,
    reader: NonblockingByteReader,
    writer: NonblockingWriter,
    decoder: Utf8IncrementalDecoder,
}

impl PtySession {
    /// Spawns `argv` in a new PTY sized to (`rows`, `columns`) with `env` as
    /// its full environment, and wires up its reader/writer/decoder.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: u32,
        argv: &[String],
        rows: u16,
        columns: u16,
        env: &HashMap<String, String>,
        chunk_size: usize,
        activity: Arc<ActivitySignal>,
    ) -> Result<Self, PtyError> {
        let handle = platform::spawn(argv, rows, columns, env)?;
        let reader = NonblockingByteReader::spawn(handle.reader()?, chunk_size, activity.clone());
        let writer = NonblockingWriter::spawn(id, handle.writer()?, activity);

        Ok(Self {
            id,
            handle,
            reader,
            writer,
            decoder: Utf8IncrementalDecoder::new(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Takes at most one buffered chunk and decodes it. Returns `None` if
    /// nothing was waiting — callers must not loop this within one
    /// supervisor pass (§4.J fairness rule: one chunk per session per pass).
    pub fn take_output(&mut self) -> Option<String> {
        let chunk = self.reader.read()?;
        Some(self.decoder.decode(&chunk))
    }

    /// Drains and sums every credit produced since the last call. Returns
    /// `0` if nothing was written.
    pub fn drain_chars_written(&self) -> u32 {
        let mut total = 0u32;
        while let Some(chars) = self.writer.next_chars_written() {
            total += chars;
        }
        total
    }

    pub fn enqueue_write(&self, data: String) {
        self.writer.write(data);
    }

    pub fn permit_data_size(&self, size: i64) {
        self.reader.permit_data_size(size);
    }

    pub fn resize(&self, rows: u16, columns: u16) -> Result<(), PtyError> {
        platform::resize(&self.handle, rows, columns)
    }

    pub fn is_alive(&mut self) -> bool {
        platform::is_alive(&mut self.handle)
    }

    pub fn terminate(&mut self) -> Result<(), PtyError> {
        platform::terminate(&mut self.handle)
    }

    /// Opens the reader's valve wide enough that any output still pending
    /// behind the PTY can drain before the session is reaped — used by
    /// `terminate` (§4.H): a dying child's last words shouldn't be dropped
    /// just because the controller's last permit was small.
    pub fn drain_permit(&self) {
        self.reader.permit_data_size(1 << 30);
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    /// Joins the reader worker thread. Safe to call once the session has
    /// been observed dead: the child's exit closes the PTY's slave side,
    /// which unblocks the reader's final read with EOF. The writer thread
    /// is deliberately not joined here — per §5 it may be parked forever
    /// waiting on an empty queue, and that is fine for a daemon-equivalent
    /// thread torn down at process exit.
    pub fn join_reader(&self) {
        self.reader.join();
    }
}
