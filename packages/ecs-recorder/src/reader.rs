//! Synchronous recording reader: pulls frames off disk one at a time
//! and hands them to `playback::apply_frame`.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::{RecorderError, RecorderResult};
use crate::frame::{read_one_frame, FrameReadOutcome, ParsedFrame};

/// Wraps a recording file for sequential reads. `read_next_frame` never
/// throws on corruption — it reports `false`, matching the recorder's
/// failure policy.
pub struct RecordingReader {
    reader: BufReader<File>,
}

impl RecordingReader {
    pub fn open<P: AsRef<Path>>(path: P) -> RecorderResult<Self> {
        let file = File::open(path).map_err(RecorderError::Io)?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Reads and returns the next frame, or `None` on clean EOF, or logs
    /// and returns `None` on corruption (the caller should stop replay).
    pub fn next_frame(&mut self) -> RecorderResult<Option<ParsedFrame>> {
        match read_one_frame(&mut self.reader)? {
            FrameReadOutcome::Frame(frame) => Ok(Some(frame)),
            FrameReadOutcome::Eof => Ok(None),
            FrameReadOutcome::Corrupt(reason) => {
                tracing::error!(reason, "recording reader encountered a corrupt frame");
                Ok(None)
            }
        }
    }

    pub fn rewind(&mut self) -> RecorderResult<()> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(RecorderError::Io)?;
        Ok(())
    }

    pub fn seek_to_byte_offset(&mut self, offset: u64) -> RecorderResult<()> {
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(RecorderError::Io)?;
        Ok(())
    }

    pub fn current_byte_offset(&mut self) -> RecorderResult<u64> {
        self.reader.stream_position().map_err(RecorderError::Io)
    }
}
