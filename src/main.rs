//! Main entry point for the zipstash CLI application.
//!
//! Extracts ZIP files from the local filesystem or from remote HTTP URLs,
//! optionally keeping a persistent on-disk cache of the remote bytes so
//! repeated invocations skip the network.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use zipstash::{
    CachedSource, Cli, DirectSource, HttpRangeReader, LocalFileReader, ZipEntry, ZipExtractor,
    ZipSource,
};

/// Application entry point.
///
/// Parses command-line arguments and dispatches based on whether the input
/// is a local file or an HTTP URL, and on whether caching was requested.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.is_http_url() {
        let reader = Arc::new(HttpRangeReader::new(cli.file.clone()).await?);
        let transferred_before = reader.transferred_bytes();

        let cached = if let Some(cache_path) = &cli.cache {
            let source = CachedSource::new(Arc::clone(&reader), cache_path.clone())?;
            let source = process_zip(source, &cli).await?;
            Some(source.cached_bytes())
        } else {
            process_zip(DirectSource::new(Arc::clone(&reader)), &cli).await?;
            None
        };

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
            if let Some(cached_bytes) = cached {
                eprintln!("Bytes staged in cache: {}", format_size(cached_bytes));
            }
        }
    } else {
        if cli.cache.is_some() {
            warn!("ignoring --cache: local archives are read in place");
        }
        let reader = LocalFileReader::new(Path::new(&cli.file))?;
        process_zip(DirectSource::new(reader), &cli).await?;
    }

    Ok(())
}

/// Process a ZIP archive based on CLI options, returning the source once the
/// read session is over.
///
/// List mode (`-l` or `-v`) displays the archive contents; otherwise the
/// entries matching the CLI filters are extracted.
async fn process_zip<S: ZipSource>(source: S, cli: &Cli) -> Result<S> {
    let mut extractor = ZipExtractor::new(source).await?;

    if cli.list || cli.verbose {
        list_files(&mut extractor, cli.verbose).await?;
        return extractor.close().await;
    }

    let entries = extractor.list_files().await?;

    // Directories are skipped (they get created as needed); positional
    // arguments select entries, -x patterns reject them.
    let files_to_extract: Vec<_> = entries
        .iter()
        .filter(|e| {
            if e.is_directory {
                return false;
            }

            if !cli.files.is_empty() {
                let matches = cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &e.file_name)
                    } else {
                        // No wildcards: exact match on filename or full path
                        let basename = Path::new(&e.file_name)
                            .file_name()
                            .map(|s| s.to_string_lossy())
                            .unwrap_or_default();
                        e.file_name == *f || basename == *f
                    }
                });
                if !matches {
                    return false;
                }
            }

            if cli
                .exclude
                .iter()
                .any(|x| e.file_name.contains(x) || glob_match(x, &e.file_name))
            {
                return false;
            }

            true
        })
        .collect();

    let multiple_files = cli.pipe && files_to_extract.len() > 1;
    for entry in files_to_extract {
        extract_file(&mut extractor, entry, cli, multiple_files).await?;
    }

    extractor.close().await
}

/// List files in the ZIP archive.
///
/// `-l` prints one name per line; `-v` prints a table with sizes,
/// compression ratios, and timestamps plus a summary row.
async fn list_files<S: ZipSource>(extractor: &mut ZipExtractor<S>, verbose: bool) -> Result<()> {
    let entries = extractor.list_files().await?;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_time();

            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio_column(entry.compressed_size, entry.uncompressed_size),
                year,
                month,
                day,
                hour,
                minute,
                entry.file_name
            );

            if !entry.is_directory {
                total_uncompressed += entry.uncompressed_size;
                total_compressed += entry.compressed_size;
                file_count += 1;
            }
        } else {
            println!("{}", entry.file_name);
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio_column(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }

    Ok(())
}

/// Compression ratio as a percentage-saved column.
fn ratio_column(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Extract a single file from the archive, honoring the pipe, output
/// directory, junk-paths, and overwrite options.
async fn extract_file<S: ZipSource>(
    extractor: &mut ZipExtractor<S>,
    entry: &ZipEntry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        if show_filename {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("--- {} ---\n", entry.file_name).as_bytes())
                .await?;
        }
        return extractor.extract_to_stdout(entry).await;
    }

    let file_name = if cli.junk_paths {
        // Junk paths: keep only the base filename
        Path::new(&entry.file_name)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.file_name.clone())
    } else {
        entry.file_name.clone()
    };

    let output_path = match &cli.extract_dir {
        Some(dir) => PathBuf::from(dir).join(&file_name),
        None => PathBuf::from(&file_name),
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.file_name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.file_name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.file_name);
    }

    extractor.extract_to_file(entry, &output_path).await?;

    Ok(())
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob matching: `*` matches zero or more characters, `?` exactly
/// one. Backtracking handles stars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                // Either the star consumes nothing, or it consumes one more
                // character of the text.
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
