use clap::Parser;
use std::path::PathBuf;
use vodrip_engine::StorageMode;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "HLS video-on-demand downloader",
    long_about = "Downloads every segment of an HLS rendition concurrently, decrypts\n\
                  AES-128 segments, and merges them in playlist order into a single\n\
                  MPEG-TS file. Accepts either a master playlist (a rendition is picked\n\
                  with --quality) or a media playlist."
)]
pub struct CliArgs {
    /// Master or media playlist URL
    #[arg(required = true, help = "URL of the master or media playlist")]
    pub url: String,

    /// Stream quality
    #[arg(
        short,
        long,
        default_value = "720",
        help = "Rendition to download: max, min, WIDTHxHEIGHT, or one of 240, 360, 480, 720, 1080"
    )]
    pub quality: String,

    /// Output file
    #[arg(
        short,
        long,
        default_value = "output.ts",
        help = "Path of the merged transport stream file"
    )]
    pub output: PathBuf,

    /// Only list qualities
    #[arg(
        short = 'l',
        long,
        help = "Print the resolutions offered by the playlist and exit"
    )]
    pub list_qualities: bool,

    /// Overwrite an existing output file
    #[arg(short, long, help = "Download even if the output file already exists")]
    pub force: bool,

    /// Number of concurrent segment downloads
    #[arg(
        short = 'c',
        long,
        default_value = "25",
        help = "Number of concurrent segment downloads"
    )]
    pub concurrency: usize,

    /// Attempts per segment
    #[arg(
        long,
        default_value = "8",
        help = "Attempts per segment before it is left out of the output. Use 0 to retry forever"
    )]
    pub retries: u32,

    /// Base retry delay in milliseconds
    #[arg(
        long,
        default_value = "500",
        help = "Base delay in milliseconds before a failed segment is retried (doubles per attempt)"
    )]
    pub retry_delay: u64,

    /// Overall HTTP timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for HTTP requests. Use 0 to disable"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// User agent override
    #[arg(long, help = "User agent sent with every request")]
    pub user_agent: Option<String>,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Where finished segments wait until the merge
    #[arg(
        long,
        value_enum,
        default_value = "disk",
        help = "Keep finished segments in temporary files (disk) or in memory"
    )]
    pub storage: StorageMode,

    /// Parent directory for temporary segment files
    #[arg(long, help = "Directory for temporary segment files (default: system temp dir)")]
    pub temp_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Show progress bars for operations
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show a progress bar while segments download"
    )]
    pub show_progress: bool,
}

impl CliArgs {
    /// Attempt budget for the engine; 0 on the command line means unlimited.
    pub fn max_attempts(&self) -> Option<u32> {
        (self.retries > 0).then_some(self.retries)
    }
}
