//! Buffered line extraction with byte-accurate position tracking.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};

/// One complete line, terminator included.
#[derive(Debug)]
pub struct Line {
    /// Bytes of the line, including the `\n` (and `\r` if present).
    pub bytes: Vec<u8>,

    /// Offset where this line started. `position + bytes.len()` is where
    /// the reader reads from next.
    pub position: u64,
}

impl Line {
    /// The line with its trailing `\n` or `\r\n` removed, lossily decoded.
    pub fn text(&self) -> String {
        let mut end = self.bytes.len();
        if end > 0 && self.bytes[end - 1] == b'\n' {
            end -= 1;
            if end > 0 && self.bytes[end - 1] == b'\r' {
                end -= 1;
            }
        }
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

/// Pulls complete lines from an open file, tracking the byte position of
/// everything consumed so far.
///
/// The position only ever advances past complete lines. A terminator-less
/// suffix at end of file is never consumed: the underlying file is seeked
/// back so a later read sees the suffix again once it has been completed.
pub struct LineReader {
    reader: BufReader<File>,
    position: u64,
}

impl LineReader {
    /// Wrap `file`, which the caller has positioned at `position`.
    pub fn new(file: File, position: u64) -> Self {
        Self {
            reader: BufReader::new(file),
            position,
        }
    }

    /// Read the next complete line. Returns `Ok(None)` at end of file,
    /// including when only a partial line remains.
    pub fn next_line(&mut self) -> io::Result<Option<Line>> {
        let mut bytes = Vec::new();
        let n = self.reader.read_until(b'\n', &mut bytes)?;

        if n == 0 {
            return Ok(None);
        }

        if bytes[n - 1] != b'\n' {
            // Partial line at EOF. Rewind (discarding the buffer) so the
            // bytes are read again once the terminator arrives.
            self.reader.seek(SeekFrom::Start(self.position))?;
            return Ok(None);
        }

        let line = Line {
            bytes,
            position: self.position,
        };
        self.position += n as u64;

        Ok(Some(line))
    }

    /// Offset of the byte after the last returned line.
    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_over(content: &[u8]) -> (tempfile::TempDir, LineReader) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.log");
        std::fs::write(&path, content).unwrap();
        let file = File::open(&path).unwrap();
        (dir, LineReader::new(file, 0))
    }

    #[test]
    fn unix_line_endings() {
        let (_dir, mut lines) = reader_over(b"line1\nline2\n");

        let line = lines.next_line().unwrap().unwrap();
        assert_eq!(line.text(), "line1");
        assert_eq!(line.position, 0);
        assert_eq!(lines.position(), 6);

        let line = lines.next_line().unwrap().unwrap();
        assert_eq!(line.text(), "line2");
        assert_eq!(lines.position(), 12);

        assert!(lines.next_line().unwrap().is_none());
    }

    #[test]
    fn windows_line_endings() {
        let (_dir, mut lines) = reader_over(b"line1\r\nline2\r\n");

        let line = lines.next_line().unwrap().unwrap();
        assert_eq!(line.text(), "line1");
        assert_eq!(lines.position(), 7);

        let line = lines.next_line().unwrap().unwrap();
        assert_eq!(line.text(), "line2");
        assert_eq!(lines.position(), 14);
    }

    #[test]
    fn partial_line_is_not_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.log");
        std::fs::write(&path, b"line1\npartial line").unwrap();

        let file = File::open(&path).unwrap();
        let mut lines = LineReader::new(file, 0);

        assert_eq!(lines.next_line().unwrap().unwrap().text(), "line1");
        assert_eq!(lines.position(), 6);

        // The suffix has no terminator yet: nothing emitted, position held.
        assert!(lines.next_line().unwrap().is_none());
        assert_eq!(lines.position(), 6);

        // Complete the line through a second handle, then poll again.
        let mut appender = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        appender.write_all(b"\n").unwrap();

        let line = lines.next_line().unwrap().unwrap();
        assert_eq!(line.text(), "partial line");
        assert_eq!(lines.position(), 19);
    }

    #[test]
    fn resumes_from_initial_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.log");
        std::fs::write(&path, b"line1\nline2\n").unwrap();

        let mut file = File::open(&path).unwrap();
        file.seek(SeekFrom::Start(6)).unwrap();
        let mut lines = LineReader::new(file, 6);

        let line = lines.next_line().unwrap().unwrap();
        assert_eq!(line.text(), "line2");
        assert_eq!(line.position, 6);
        assert_eq!(lines.position(), 12);
    }
}
