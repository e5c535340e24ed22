use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI для QuiverLSM: запись, чтение, компакция и статус хранилища.
#[derive(Parser, Debug)]
#[command(name = "quiverlsm", version, about = "QuiverLSM CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Set key to value (value as string, hex:, @file or - for stdin)
    Put {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        /// Value argument. Ignored if --value-file is set.
        #[arg(long)]
        value: Option<String>,
        /// Read value bytes from a file
        #[arg(long)]
        value_file: Option<PathBuf>,
    },
    /// Get the latest value of a key
    Get {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        /// Optional file to write raw value into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete key (point tombstone)
    Del {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Delete every key in [start, end)
    DelRange {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Append a merge operand to key
    Merge {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        key: String,
        /// Operand argument (string, hex:, @file or -)
        #[arg(long)]
        operand: String,
    },
    /// Scan with optional prefix. --json prints a JSON array.
    Scan {
        #[arg(long)]
        path: PathBuf,
        /// Optional UTF-8 prefix
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compact tables overlapping [start, end), or all tables.
    ///
    /// Версии ниже GC-горизонта (нет открытых снапшотов, которым они нужны)
    /// схлопываются; покрытые удаления выбрасываются.
    Compact {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, requires = "end")]
        start: Option<String>,
        #[arg(long, requires = "start")]
        end: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print store status and metrics
    Status {
        #[arg(long)]
        path: PathBuf,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}
