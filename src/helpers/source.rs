//! Seekable byte source over either a local file or an in-memory buffer.

use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

/// Input byte stream for the spreadsheet parsers.
///
/// Uploaded content arrives as an in-memory buffer; command-line usage reads
/// straight from disk. Both sides of the enum behave identically through the
/// `Read + Seek` impls below.
pub enum Source {
    Local(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Source {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Source> {
        Ok(Source::Local(BufReader::new(File::open(path)?)))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Source {
        Source::Memory(Cursor::new(bytes))
    }

    /// Reads the leading `N` bytes and rewinds, for container sniffing.
    pub(crate) fn peek<const N: usize>(&mut self) -> std::io::Result<[u8; N]> {
        let mut magic = [0u8; N];
        self.seek(SeekFrom::Start(0))?;
        self.read_exact(&mut magic)?;
        self.seek(SeekFrom::Start(0))?;
        Ok(magic)
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Source::Local(reader) => reader.read(buf),
            Source::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            Source::Local(reader) => reader.seek(pos),
            Source::Memory(reader) => reader.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_rewinds_the_stream() {
        let mut source = Source::from_bytes(b"PK\x03\x04rest".to_vec());
        assert_eq!(&source.peek::<4>().unwrap(), b"PK\x03\x04");

        let mut content = Vec::new();
        source.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"PK\x03\x04rest");
    }

    #[test]
    fn peek_fails_on_short_input() {
        let mut source = Source::from_bytes(b"PK".to_vec());
        assert!(source.peek::<4>().is_err());
    }
}
