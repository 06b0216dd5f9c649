use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipstash")]
#[command(version)]
#[command(about = "A Rust unzip utility with HTTP URL support and a persistent byte cache", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstash data1.zip -x joe      extract all files except joe from data1.zip\n  \
  zipstash -p foo.zip | more     send contents of foo.zip via pipe into more\n  \
  zipstash -l https://example.com/archive.zip   list files from remote ZIP\n  \
  zipstash -c /tmp/a.cache https://example.com/archive.zip doc.txt\n  \
                                 extract doc.txt, keeping fetched bytes for next time")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Cache remote archive bytes in FILE (plus FILE.frag_data) across runs
    #[arg(short = 'c', long = "cache", value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}
