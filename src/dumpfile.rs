//! Read-only access to a profile dump file.
//!
//! The file is memory-mapped when possible; otherwise the whole contents
//! are read into an owned buffer. Either way, lines are handed out as
//! zero-copy views.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::scan::Scan;

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// One opened dump file.
pub struct DumpFile {
    path: PathBuf,
    backing: Backing,
}

impl DumpFile {
    pub fn open(path: &Path) -> Result<DumpFile, String> {
        let file = File::open(path)
            .map_err(|e| format!("cannot open '{}': {}", path.display(), e))?;

        // SAFETY: the mapping is read-only and private to this process;
        // concurrent truncation of the underlying file is not supported.
        let backing = match unsafe { Mmap::map(&file) } {
            Ok(map) => Backing::Mapped(map),
            Err(_) => {
                let mut buf = Vec::new();
                let mut file = file;
                file.read_to_end(&mut buf)
                    .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
                Backing::Owned(buf)
            }
        };

        Ok(DumpFile {
            path: path.to_path_buf(),
            backing,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(map) => map,
            Backing::Owned(buf) => buf,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lines(&self) -> LineCursor<'_> {
        LineCursor {
            data: self.bytes(),
            offset: 0,
        }
    }
}

/// Line-by-line walk over the file contents.
pub struct LineCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LineCursor<'a> {
    /// Byte offset of the next unread line, for progress reporting.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The next line as a view, without the terminating newline. A
    /// trailing `\r` is dropped. Returns `None` at end of input.
    pub fn next_line(&mut self) -> Option<Scan<'a>> {
        if self.offset >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.offset..];
        let (mut line, advance) = match rest.iter().position(|&c| c == b'\n' || c == 0) {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        self.offset += advance;
        Some(Scan::new(line))
    }
}

/// Format detection: a Callgrind/Cachegrind file either starts with the
/// `# callgrind format` marker, or has an `events:` or `creator:` line
/// starting within the first 2048 bytes.
pub fn matches_format(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(2047)];

    if head.starts_with(b"# callgrind format\n") {
        return true;
    }
    at_line_start(head, b"events:") || at_line_start(head, b"creator:")
}

fn at_line_start(buf: &[u8], prefix: &[u8]) -> bool {
    let mut start = 0;
    loop {
        if buf[start..].starts_with(prefix) {
            return true;
        }
        match buf[start..].iter().position(|&c| c == b'\n') {
            Some(i) => start += i + 1,
            None => return false,
        }
        if start >= buf.len() {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(content).expect("write");
        f
    }

    #[test]
    fn test_line_iteration() {
        let f = temp_with(b"one\ntwo\r\nthree");
        let df = DumpFile::open(f.path()).unwrap();
        let mut lines = df.lines();
        assert_eq!(lines.next_line().unwrap().to_text(), "one");
        assert_eq!(lines.next_line().unwrap().to_text(), "two");
        assert_eq!(lines.next_line().unwrap().to_text(), "three");
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn test_offset_advances() {
        let f = temp_with(b"ab\ncd\n");
        let df = DumpFile::open(f.path()).unwrap();
        let mut lines = df.lines();
        assert_eq!(lines.offset(), 0);
        lines.next_line();
        assert_eq!(lines.offset(), 3);
        lines.next_line();
        assert_eq!(lines.offset(), 6);
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_empty_file() {
        let f = temp_with(b"");
        let df = DumpFile::open(f.path()).unwrap();
        assert!(df.is_empty());
        assert!(df.lines().next_line().is_none());
    }

    #[test]
    fn test_open_missing() {
        assert!(DumpFile::open(Path::new("/nonexistent/x.out")).is_err());
    }

    #[test]
    fn test_format_detection() {
        assert!(matches_format(b"# callgrind format\nversion: 1\n"));
        assert!(matches_format(b"events: Ir\nfl=a.c\n"));
        assert!(matches_format(b"version: 1\ncreator: callgrind-3.12\n"));
        assert!(!matches_format(b"ELF\x7f binary junk"));
        // prefix must start a line
        assert!(!matches_format(b"xevents: Ir\n"));
    }
}
