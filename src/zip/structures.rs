use byteorder::{LittleEndian, ReadBytesExt};

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unsupported(value),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

/// Strip a four-byte signature off the front of a header buffer.
fn strip_signature<'a>(data: &'a [u8], signature: &[u8; 4], what: &str) -> Result<&'a [u8]> {
    if data.len() < 4 || data[..4] != signature[..] {
        bail!("Invalid {what}");
    }
    Ok(&data[4..])
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct Eocd {
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl Eocd {
    pub const SIGNATURE: &'static [u8; 4] = b"PK\x05\x06";
    pub const LEN: usize = 22;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            bail!("Invalid End of Central Directory");
        }
        let mut body = strip_signature(data, Self::SIGNATURE, "End of Central Directory")?;

        let _disk_number = body.read_u16::<LittleEndian>()?;
        let _disk_with_cd = body.read_u16::<LittleEndian>()?;
        let disk_entries = body.read_u16::<LittleEndian>()?;
        let total_entries = body.read_u16::<LittleEndian>()?;
        let cd_size = body.read_u32::<LittleEndian>()?;
        let cd_offset = body.read_u32::<LittleEndian>()?;
        let comment_len = body.read_u16::<LittleEndian>()?;

        Ok(Self {
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment_len,
        })
    }

    /// Whether any field overflowed into the ZIP64 records.
    pub fn needs_zip64(&self) -> bool {
        self.disk_entries == u16::MAX
            || self.total_entries == u16::MAX
            || self.cd_size == u32::MAX
            || self.cd_offset == u32::MAX
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64Locator {
    pub eocd64_offset: u64,
}

impl Zip64Locator {
    pub const SIGNATURE: &'static [u8; 4] = b"PK\x06\x07";
    pub const LEN: usize = 20;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            bail!("Invalid ZIP64 format");
        }
        let mut body = strip_signature(data, Self::SIGNATURE, "ZIP64 format")?;

        let _disk_with_eocd64 = body.read_u32::<LittleEndian>()?;
        let eocd64_offset = body.read_u64::<LittleEndian>()?;

        Ok(Self { eocd64_offset })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64Eocd {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64Eocd {
    pub const SIGNATURE: &'static [u8; 4] = b"PK\x06\x06";
    pub const MIN_LEN: usize = 56;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            bail!("Invalid ZIP64 format");
        }
        let mut body = strip_signature(data, Self::SIGNATURE, "ZIP64 format")?;

        let _eocd64_size = body.read_u64::<LittleEndian>()?;
        let _version_made_by = body.read_u16::<LittleEndian>()?;
        let _version_needed = body.read_u16::<LittleEndian>()?;
        let _disk_number = body.read_u32::<LittleEndian>()?;
        let _disk_with_cd = body.read_u32::<LittleEndian>()?;
        let _disk_entries = body.read_u64::<LittleEndian>()?;
        let total_entries = body.read_u64::<LittleEndian>()?;
        let cd_size = body.read_u64::<LittleEndian>()?;
        let cd_offset = body.read_u64::<LittleEndian>()?;

        Ok(Self {
            total_entries,
            cd_size,
            cd_offset,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CENTRAL_HEADER_SIGNATURE: &[u8; 4] = b"PK\x01\x02";
pub const CENTRAL_HEADER_LEN: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LOCAL_HEADER_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
pub const LOCAL_HEADER_LEN: usize = 30;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
}

impl ZipEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
