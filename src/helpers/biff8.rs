//! BIFF8 record reader for the Excel 97-2003 binary workbook stream.
//! Records are `[type u16][length u16][payload]`, where a logical record may
//! continue across CONTINUE records.

use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use crate::spreadsheet::ParseError;
use encoding_rs::Encoding;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub(crate) enum Biff8Error {
    #[error("fewer than {0} bytes remaining in record")]
    OutOfData(usize),
}

/// Cursor over a BIFF8 stream. `next` frames the following logical record
/// (gathering CONTINUE chunks); the `read_*` methods consume its payload.
pub(crate) struct Biff8Reader {
    /// Code page for byte-compressed strings, switched by the CODEPAGE record.
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    pointer: usize,
    chunks: Vec<(usize, usize)>,
    index: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: encoding_rs::UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Frames the next record and returns its type, or `None` at end of stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, ParseError> {
        if self.pointer + 4 < self.buffer.len() {
            self.index = 0;
            self.offset = 0;

            let kind = self.get_u16_at(self.pointer)?;
            let size = self.get_u16_at(self.pointer + 2)? as usize;
            let mut lower = self.pointer + 4;
            let mut upper = lower + size;
            self.pointer = upper;

            self.chunks.clear();
            self.chunks.push((lower, upper));
            while self.pointer + 4 < self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE
            {
                let size = self.get_u16_at(self.pointer + 2)? as usize;
                lower = self.pointer + 4;
                upper = lower + size;
                self.pointer = upper;
                self.chunks.push((lower, upper));
            }

            Ok(Some(kind))
        } else {
            Ok(None)
        }
    }

    /// Repositions the stream, used to jump to a BOUNDSHEET offset.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    fn read_extract(&mut self, length: usize) -> Result<&[u8], ParseError> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::OutOfData(length).into())
        }
    }

    /// Reads up to `length` bytes from the current record chunk, returning the
    /// slice and the number of bytes actually available.
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index) {
            let source = (*upper).min(*lower + self.offset);
            let target = (*upper).min(source + length);
            let size = target - source;
            if source < *upper {
                if target == *upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += size;
                }
                return (&self.buffer[source..target], size);
            }
        }
        (&[], 0)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<&[u8], ParseError> {
        self.read_extract(length)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ParseError> {
        self.read_extract(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_extract(2).map(to_u16)
    }

    /// Reads a u16 counted backwards from the end of the current record,
    /// which is how MULRK encodes its last column.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, ParseError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset < *upper {
                let index = *upper - offset;
                return self.get_u16_at(index);
            } else {
                offset -= *upper - *lower;
            }
        }
        Err(Biff8Error::OutOfData(2).into())
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, ParseError> {
        if index + 2 <= self.buffer.len() {
            Ok(to_u16(&self.buffer[index..index + 2]))
        } else {
            Err(Biff8Error::OutOfData(2).into())
        }
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_extract(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, ParseError> {
        self.read_extract(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, ParseError> {
        self.read_extract(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, ParseError> {
        self.read_extract(8).map(to_f64)
    }

    /// Decodes an RK value, Excel's packed 30-bit numeric format.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, ParseError> {
        let value = self.read_u32()?;
        let is_percentage = (value & 0x01) != 0;
        let is_integer = (value & 0x02) != 0;

        let mut value = if is_integer {
            ((value as i32) >> 2) as f64
        } else {
            let value = (value >> 2) as u64;
            f64::from_bits(value << 34)
        };
        if is_percentage {
            value /= 100.0;
        }
        Ok(if is_integer && !is_percentage {
            (value.trunc() as i64).to_string()
        } else {
            value.to_string()
        })
    }

    /// ShortXLUnicodeString: 1-byte character count.
    pub(crate) fn read_short_unicode_string(&mut self) -> Result<String, ParseError> {
        let mut string = String::new();
        let chars = self.read_u8()? as usize;
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeString: 2-byte character count.
    pub(crate) fn read_unicode_string(&mut self) -> Result<String, ParseError> {
        let mut string = String::new();
        let chars = self.read_u16()? as usize;
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeRichExtendedString, as stored in the shared string table. The
    /// compression flag restarts at every CONTINUE boundary, hence the loop.
    pub(crate) fn read_rich_extended_string(&mut self) -> Result<String, ParseError> {
        let mut string = String::new();
        let mut expected = self.read_u16()? as usize;
        let mut actual = self.read_string_into(expected, true, &mut string)?;
        while actual < expected {
            expected -= actual;
            actual = self.read_string_into(expected, false, &mut string)?;
        }
        Ok(string)
    }

    fn read_string_into(
        &mut self,
        chars: usize,
        is_extended: bool,
        content: &mut String,
    ) -> Result<usize, ParseError> {
        let encoding = self.encoding;
        let flag = self.read_u8()?;
        let is_wide = (flag & 0x1) > 0;
        let expected = Self::chars_to_bytes(is_wide, chars);
        let rich_run_count = if is_extended && (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extended && (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };
        let (bytes, actual) = self.read(expected);
        if is_wide {
            let (string, _, _) = encoding.decode(bytes);
            content.push_str(&string);
        } else {
            // Byte-compressed strings are UTF-16 with the high byte stripped
            let units = bytes.iter().map(|byte| *byte as u16).collect::<Vec<u16>>();
            content.push_str(&String::from_utf16_lossy(&units));
        }
        // Skip rgRun and ExtRst trailers
        self.skip(4 * rich_run_count)?;
        self.skip(phonetic_size)?;
        Ok(Self::bytes_to_chars(is_wide, actual))
    }

    #[inline]
    fn chars_to_bytes(is_wide: bool, chars: usize) -> usize {
        if is_wide {
            chars << 1
        } else {
            chars
        }
    }

    #[inline]
    fn bytes_to_chars(is_wide: bool, bytes: usize) -> usize {
        if is_wide {
            bytes >> 1
        } else {
            bytes
        }
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
