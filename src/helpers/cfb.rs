//! OLE Compound File Binary reader, the container wrapped around legacy
//! Excel (.xls) workbook streams.

use crate::helpers::string::to_u16;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use crate::helpers::string::to_usize_iter;
use crate::spreadsheet::ParseError;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

const MAX_REG_SECT: usize = 0xFFFF_FFFB;
const OLE_SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;

#[derive(Error, Debug)]
pub(crate) enum CfbError {
    #[error("file is too small to hold a compound file header")]
    TruncatedFile,

    #[error("invalid OLE signature (not an office document?)")]
    InvalidSignature,

    #[error("unsupported sector size '2 ^ {1}' for major version '{0}'")]
    SectorSize(u16, u16),

    #[error("DIFAT sector count mismatch: expected {0}, walked {1}")]
    DifatCount(usize, usize),

    #[error("FAT sector count mismatch: expected {0}, loaded {1}")]
    FatCount(usize, usize),

    #[error("empty root directory")]
    EmptyDirectory,

    #[error("sector chain does not terminate")]
    UnterminatedChain,
}

/// In-memory view of a compound file: directory entries plus the regular and
/// mini sector chains needed to reassemble a named stream.
pub(crate) struct Cfb {
    directories: HashMap<String, Directory>,
    fat: Vec<usize>,
    sectors: Sectors,
    mini_fat: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Loads the whole container and parses its allocation tables.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, ParseError> {
        let size = reader.seek(SeekFrom::End(0))?;
        if size < 512 {
            return Err(CfbError::TruncatedFile.into());
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data: Vec<u8> = vec![0u8; size as usize];
        reader.read_exact(&mut data)?;

        let header = Header::new(&data[..512])?;
        let sectors = Sectors {
            data,
            size: header.sector_size()?,
        };
        let fat = Self::load_fat(&sectors, &header)?;
        let directories = Self::load_directories(&fat, &sectors, header.directory_sector)?;
        let mini_fat = Self::load_mini_fat(&fat, &sectors, &header)?;
        let mini_sectors = if let Some(root) = directories.get("Root Entry") {
            let mut data = Self::read_chain(&fat, &sectors, root.sector)?;
            data.truncate(root.size);
            Sectors { data, size: 64 }
        } else {
            Sectors {
                data: Vec::new(),
                size: 64,
            }
        };

        Ok(Cfb {
            directories,
            fat,
            sectors,
            mini_fat,
            mini_sectors,
        })
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reassembles a named stream, or `None` when the directory has no such
    /// entry. Streams under 4096 bytes live in the mini sector chain.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, ParseError> {
        let Some(directory) = self.directories.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.size < 4096 {
            Self::read_chain(&self.mini_fat, &self.mini_sectors, directory.sector)?
        } else {
            Self::read_chain(&self.fat, &self.sectors, directory.sector)?
        };
        bytes.truncate(directory.size);
        Ok(Some(bytes))
    }

    /// Walks the DIFAT (109 header entries plus chained DIFAT sectors) and
    /// loads every FAT sector it points at.
    fn load_fat(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, ParseError> {
        let mut difat = Vec::<usize>::new();
        difat.extend(to_usize_iter(sectors.header_slice(76..512)));

        // A valid DIFAT chain visits each sector at most once; a repeated
        // sector would otherwise loop forever
        let limit = header.difat_count.min(sectors.count());
        let mut count = 0usize;
        let mut index = header.difat_sector;
        while index < MAX_REG_SECT {
            if count >= limit {
                return Err(CfbError::UnterminatedChain.into());
            }
            difat.extend(to_usize_iter(sectors.get(index)));
            index = difat.pop().ok_or(CfbError::TruncatedFile)?;
            count += 1;
        }
        if count != header.difat_count {
            return Err(CfbError::DifatCount(header.difat_count, count).into());
        }

        let mut fat: Vec<usize> = Vec::new();
        let mut count = 0usize;
        for index in difat {
            if index < MAX_REG_SECT {
                fat.extend(to_usize_iter(sectors.get(index)));
                count += 1;
            }
        }
        if count != header.fat_count {
            return Err(CfbError::FatCount(header.fat_count, count).into());
        }

        Ok(fat)
    }

    fn load_directories(
        fat: &[usize],
        sectors: &Sectors,
        index: usize,
    ) -> Result<HashMap<String, Directory>, ParseError> {
        let bytes = Self::read_chain(fat, sectors, index)?;
        let directories: HashMap<String, Directory> =
            bytes.chunks_exact(128).map(Directory::new).collect();
        if directories.is_empty() {
            return Err(CfbError::EmptyDirectory.into());
        }
        Ok(directories)
    }

    fn load_mini_fat(
        fat: &[usize],
        sectors: &Sectors,
        header: &Header,
    ) -> Result<Vec<usize>, ParseError> {
        Ok(if header.mini_fat_count > 0 {
            let bytes = Self::read_chain(fat, sectors, header.mini_fat_sector)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        })
    }

    /// Follows a FAT chain from `index` and concatenates the visited sectors.
    /// A chain longer than the FAT itself must contain a cycle.
    fn read_chain(fat: &[usize], sectors: &Sectors, index: usize) -> Result<Vec<u8>, ParseError> {
        let mut content: Vec<u8> = Vec::new();
        let mut remaining = fat.len();
        let mut index = index;
        while index < MAX_REG_SECT {
            if remaining == 0 {
                return Err(CfbError::UnterminatedChain.into());
            }
            remaining -= 1;
            content.extend(sectors.get(index));
            index = *fat.get(index).ok_or(CfbError::TruncatedFile)?;
        }
        Ok(content)
    }
}

struct Sectors {
    data: Vec<u8>,
    size: usize,
}

impl Sectors {
    /// Sector 0 starts right after the 512-byte header.
    fn get(&self, index: usize) -> &[u8] {
        let source = (index + 1) * self.size;
        let target = self.data.len().min((index + 2) * self.size);
        &self.data[source.min(target)..target]
    }

    fn header_slice(&self, range: std::ops::Range<usize>) -> &[u8] {
        &self.data[range]
    }

    fn count(&self) -> usize {
        self.data.len() / self.size
    }
}

struct Header {
    signature: u64,
    major_version: u16,
    sector_shift: u16,
    fat_count: usize,
    directory_sector: usize,
    mini_fat_sector: usize,
    mini_fat_count: usize,
    difat_sector: usize,
    difat_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, ParseError> {
        let header = Header {
            signature: to_u64(&data[0..8]),
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            fat_count: to_usize(&data[44..48]),
            directory_sector: to_usize(&data[48..52]),
            mini_fat_sector: to_usize(&data[60..64]),
            mini_fat_count: to_usize(&data[64..68]),
            difat_sector: to_usize(&data[68..72]),
            difat_count: to_usize(&data[72..76]),
        };

        if header.signature != OLE_SIGNATURE {
            return Err(CfbError::InvalidSignature.into());
        }

        Ok(header)
    }

    fn sector_size(&self) -> Result<usize, ParseError> {
        if self.major_version == 3 && self.sector_shift == 0x0009 {
            Ok(512)
        } else if self.major_version == 4 && self.sector_shift == 0x000C {
            // Version 4 headers are still 512 bytes; the remainder of the
            // first 4096-byte sector must be zero filled.
            Ok(4096)
        } else {
            Err(CfbError::SectorSize(self.major_version, self.sector_shift).into())
        }
    }
}

/// One 128-byte directory entry: UTF-16 name, first sector, stream size.
struct Directory {
    sector: usize,
    size: usize,
}

impl Directory {
    fn new(bytes: &[u8]) -> (String, Directory) {
        let size = to_u16(&bytes[64..66]) as usize;
        let (name, _, _) = UTF_16LE.decode(&bytes[..size.min(64)]);
        let name = if let Some(position) = name.find('\0') {
            name[..position].to_owned()
        } else {
            name.to_string()
        };

        let sector = to_usize(&bytes[116..120]);
        let size = to_u64(&bytes[120..128]) as usize;
        (name, Directory { sector, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FREE_SECT: u32 = 0xFFFF_FFFF;

    /// Valid v3 header with an empty header DIFAT.
    fn header(fat_count: u32, difat_sector: u32, difat_count: u32) -> Vec<u8> {
        let mut data = vec![0u8; 512];
        data[..8].copy_from_slice(&OLE_SIGNATURE.to_le_bytes());
        data[26..28].copy_from_slice(&3u16.to_le_bytes());
        data[30..32].copy_from_slice(&9u16.to_le_bytes());
        data[44..48].copy_from_slice(&fat_count.to_le_bytes());
        data[48..52].copy_from_slice(&1u32.to_le_bytes());
        data[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        data[68..72].copy_from_slice(&difat_sector.to_le_bytes());
        data[72..76].copy_from_slice(&difat_count.to_le_bytes());
        for offset in (76..512).step_by(4) {
            data[offset..offset + 4].copy_from_slice(&FREE_SECT.to_le_bytes());
        }
        data
    }

    #[test]
    fn rejects_short_files() {
        let mut reader = Cursor::new(vec![0u8; 100]);
        assert!(matches!(
            Cfb::new(&mut reader),
            Err(ParseError::Cfb(CfbError::TruncatedFile))
        ));
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut data = vec![0u8; 512];
        data[..8].copy_from_slice(b"NOTANOLE");
        let mut reader = Cursor::new(data);
        assert!(matches!(
            Cfb::new(&mut reader),
            Err(ParseError::Cfb(CfbError::InvalidSignature))
        ));
    }

    #[test]
    fn truncated_sectors_fail_instead_of_panicking() {
        // First DIFAT entry points at a FAT sector cut off mid-entry
        let mut data = header(1, END_OF_CHAIN, 0);
        data[76..80].copy_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        let mut reader = Cursor::new(data);
        assert!(matches!(
            Cfb::new(&mut reader),
            Err(ParseError::Cfb(_))
        ));
    }

    #[test]
    fn difat_cycles_fail_instead_of_looping() {
        // Sector 0 is all zeros, so its chain link points back at itself
        let mut data = header(0, 0, 1000);
        data.extend_from_slice(&[0u8; 512]);
        let mut reader = Cursor::new(data);
        assert!(matches!(
            Cfb::new(&mut reader),
            Err(ParseError::Cfb(CfbError::UnterminatedChain))
        ));
    }

    #[test]
    fn sector_cycles_fail_instead_of_looping() {
        let sectors = Sectors {
            data: vec![0u8; 512 * 3],
            size: 512,
        };
        let fat = vec![1usize, 0, MAX_REG_SECT];
        assert!(matches!(
            Cfb::read_chain(&fat, &sectors, 0),
            Err(ParseError::Cfb(CfbError::UnterminatedChain))
        ));
    }
}
