use std::io::Read;
use std::path::Path;

use flate2::read::DeflateDecoder;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use anyhow::{Context, Result, bail};

use super::parser::ZipParser;
use super::source::ZipSource;
use super::structures::{CompressionMethod, ZipEntry};

/// ZIP file extractor
pub struct ZipExtractor<S> {
    parser: ZipParser<S>,
}

impl<S: ZipSource> ZipExtractor<S> {
    /// Open a read session on `source`.
    pub async fn new(source: S) -> Result<Self> {
        Ok(Self {
            parser: ZipParser::open(source).await?,
        })
    }

    /// End the session and hand the source back, e.g. to collect statistics.
    pub async fn close(self) -> Result<S> {
        self.parser.close().await
    }

    /// List all files in the archive
    pub async fn list_files(&mut self) -> Result<Vec<ZipEntry>> {
        self.parser.read_central_directory().await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let data_offset = self.parser.data_offset(entry).await?;

        let mut compressed = vec![0u8; entry.compressed_size as usize];
        self.parser
            .read_exact_at(data_offset, &mut compressed)
            .await?;

        match entry.compression_method {
            CompressionMethod::Stored => Ok(compressed),
            CompressionMethod::Deflate => {
                let mut data = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(compressed.as_slice())
                    .read_to_end(&mut data)
                    .with_context(|| format!("failed to inflate {}", entry.file_name))?;
                Ok(data)
            }
            CompressionMethod::Unsupported(method) => {
                bail!("Unsupported compression method: {method}");
            }
        }
    }

    /// Extract file to disk
    pub async fn extract_to_file(&mut self, entry: &ZipEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry).await?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;

        Ok(())
    }

    /// Extract file to stdout
    pub async fn extract_to_stdout(&mut self, entry: &ZipEntry) -> Result<()> {
        let data = self.extract_to_memory(entry).await?;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&data).await?;

        Ok(())
    }
}
