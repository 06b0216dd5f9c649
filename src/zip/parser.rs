//! Low-level ZIP archive parser.
//!
//! Parses the binary ZIP structures out of any [`ZipSource`], reading only
//! the pieces it needs: the End of Central Directory at the tail, the ZIP64
//! records when present, the Central Directory, and individual Local File
//! Headers on extraction. Against a cached or ranged source this keeps the
//! bytes touched proportional to the entries actually used, not the archive.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::SeekFrom;

use anyhow::{Context, Result, bail};

use super::source::ZipSource;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// ZIP64 extended information extra field id.
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Low-level ZIP file parser.
///
/// Owns the source for the duration of the session. The source's offset is
/// parser-private state; callers interact through entry-level operations.
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor) rather than
/// directly.
pub struct ZipParser<S> {
    source: S,
    size: u64,
}

impl<S: ZipSource> ZipParser<S> {
    /// Begin a read session on `source`.
    pub async fn open(mut source: S) -> Result<Self> {
        source.open().await?;
        let size = source.size();
        Ok(Self { source, size })
    }

    /// End the session and hand the source back.
    pub async fn close(mut self) -> Result<S> {
        self.source.close().await?;
        Ok(self.source)
    }

    /// Fill `buf` exactly from `offset`.
    ///
    /// Sources may return short counts (a cached source stops at every range
    /// boundary), so this loops until the buffer is full and treats EOF
    /// before that as a truncated archive.
    pub async fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.source.seek(SeekFrom::Start(offset)).await?;
        let mut filled = 0;
        while filled < buf.len() {
            let got = self.source.read(&mut buf[filled..]).await?;
            if got == 0 {
                bail!("archive truncated at offset {}", offset + filled as u64);
            }
            filled += got;
        }
        Ok(())
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD sits at the very end of the archive unless a comment
    /// follows it. The comment-free case is tried first with a single fixed
    /// read; otherwise the tail is scanned backwards for the signature.
    ///
    /// Returns the record and its offset in the archive.
    pub async fn find_eocd(&mut self) -> Result<(Eocd, u64)> {
        if self.size >= Eocd::LEN as u64 {
            let offset = self.size - Eocd::LEN as u64;
            let mut buf = vec![0u8; Eocd::LEN];
            self.read_exact_at(offset, &mut buf).await?;

            // Signature plus a zero-length comment: done.
            if buf[0..4] == Eocd::SIGNATURE[..] && buf[20..22] == [0, 0] {
                return Ok((Eocd::parse(&buf)?, offset));
            }
        }

        // A trailing comment pushed the EOCD inward. Fetch the maximum
        // possible tail in one read and scan backwards for the signature.
        let search_size = (MAX_COMMENT_SIZE + Eocd::LEN as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.read_exact_at(search_start, &mut buf).await?;

        for i in (0..buf.len().saturating_sub(Eocd::LEN)).rev() {
            if buf[i..i + 4] == Eocd::SIGNATURE[..] {
                // Candidate record: it is genuine only if its comment-length
                // field accounts for every byte after it.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
                if comment_len == buf.len() - i - Eocd::LEN {
                    let eocd = Eocd::parse(&buf[i..i + Eocd::LEN])?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD has overflowed fields. The ZIP64 EOCD
    /// locator sits immediately before the regular EOCD and points at the
    /// real record.
    pub async fn read_zip64_eocd(&mut self, eocd_offset: u64) -> Result<Zip64Eocd> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64Locator::LEN as u64)
            .context("no room for a ZIP64 locator before the EOCD")?;
        let mut locator_buf = vec![0u8; Zip64Locator::LEN];
        self.read_exact_at(locator_offset, &mut locator_buf).await?;
        let locator = Zip64Locator::parse(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64Eocd::MIN_LEN];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;
        Zip64Eocd::parse(&eocd64_buf)
    }

    /// Read and parse the whole Central Directory.
    ///
    /// The directory is fetched in a single read (one Range request against
    /// an HTTP source) and split into [`ZipEntry`] records.
    pub async fn read_central_directory(&mut self) -> Result<Vec<ZipEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.needs_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut rest = cd_data.as_slice();
        for _ in 0..total_entries {
            entries.push(parse_central_entry(&mut rest)?);
        }

        Ok(entries)
    }

    /// Locate the first byte of an entry's data.
    ///
    /// The Local File Header repeats the variable-length name and extra
    /// fields with lengths that may differ from the Central Directory copy,
    /// so the header must be read to know where the payload starts.
    pub async fn data_offset(&mut self, entry: &ZipEntry) -> Result<u64> {
        let mut lfh = vec![0u8; LOCAL_HEADER_LEN];
        self.read_exact_at(entry.lfh_offset, &mut lfh).await?;

        if lfh[0..4] != LOCAL_HEADER_SIGNATURE[..] {
            bail!("Invalid Local File Header");
        }

        // The two variable-length field sizes sit at fixed positions 26..30.
        let file_name_length = u16::from_le_bytes([lfh[26], lfh[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh[28], lfh[29]]) as u64;

        Ok(entry.lfh_offset + LOCAL_HEADER_LEN as u64 + file_name_length + extra_field_length)
    }
}

/// Parse one Central Directory File Header off the front of `data`,
/// advancing the slice past the header and its variable-length tail.
fn parse_central_entry(data: &mut &[u8]) -> Result<ZipEntry> {
    if data.len() < CENTRAL_HEADER_LEN || data[..4] != CENTRAL_HEADER_SIGNATURE[..] {
        bail!("Invalid Central Directory File Header");
    }

    let mut fixed = &data[4..CENTRAL_HEADER_LEN];
    let _version_made_by = fixed.read_u16::<LittleEndian>()?;
    let _version_needed = fixed.read_u16::<LittleEndian>()?;
    let _flags = fixed.read_u16::<LittleEndian>()?;
    let compression_method = fixed.read_u16::<LittleEndian>()?;
    let last_mod_time = fixed.read_u16::<LittleEndian>()?;
    let last_mod_date = fixed.read_u16::<LittleEndian>()?;
    let crc32 = fixed.read_u32::<LittleEndian>()?;
    let mut compressed_size = fixed.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = fixed.read_u32::<LittleEndian>()? as u64;
    let file_name_length = fixed.read_u16::<LittleEndian>()? as usize;
    let extra_field_length = fixed.read_u16::<LittleEndian>()? as usize;
    let file_comment_length = fixed.read_u16::<LittleEndian>()? as usize;
    let _disk_number_start = fixed.read_u16::<LittleEndian>()?;
    let _internal_attrs = fixed.read_u16::<LittleEndian>()?;
    let _external_attrs = fixed.read_u32::<LittleEndian>()?;
    let mut lfh_offset = fixed.read_u32::<LittleEndian>()? as u64;

    let header_len = CENTRAL_HEADER_LEN + file_name_length + extra_field_length;
    let total_len = header_len + file_comment_length;
    if data.len() < total_len {
        bail!("Truncated Central Directory");
    }

    let name_bytes = &data[CENTRAL_HEADER_LEN..CENTRAL_HEADER_LEN + file_name_length];
    // Lossy conversion keeps non-UTF8 names listable instead of fatal.
    let file_name = String::from_utf8_lossy(name_bytes).to_string();
    let is_directory = file_name.ends_with('/');

    let extra = &data[CENTRAL_HEADER_LEN + file_name_length..header_len];
    apply_zip64_extra(
        extra,
        &mut uncompressed_size,
        &mut compressed_size,
        &mut lfh_offset,
    )?;

    *data = &data[total_len..];

    Ok(ZipEntry {
        file_name,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        is_directory,
    })
}

/// Walk an entry's extra fields and patch in 64-bit values from the ZIP64
/// extended information field, if present.
///
/// Each 64-bit value appears only when the corresponding 32-bit header field
/// is saturated, in the fixed order size/compressed-size/offset.
fn apply_zip64_extra(
    mut extra: &[u8],
    uncompressed_size: &mut u64,
    compressed_size: &mut u64,
    lfh_offset: &mut u64,
) -> Result<()> {
    while extra.len() >= 4 {
        let id = u16::from_le_bytes([extra[0], extra[1]]);
        let len = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        let body_end = (4 + len).min(extra.len());
        let mut body = &extra[4..body_end];

        if id == ZIP64_EXTRA_ID {
            if *uncompressed_size == u32::MAX as u64 && body.len() >= 8 {
                *uncompressed_size = body.read_u64::<LittleEndian>()?;
            }
            if *compressed_size == u32::MAX as u64 && body.len() >= 8 {
                *compressed_size = body.read_u64::<LittleEndian>()?;
            }
            if *lfh_offset == u32::MAX as u64 && body.len() >= 8 {
                *lfh_offset = body.read_u64::<LittleEndian>()?;
            }
        }

        extra = &extra[body_end..];
    }
    Ok(())
}
