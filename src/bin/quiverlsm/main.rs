use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_put;
mod cmd_get;
mod cmd_del;
mod cmd_delrange;
mod cmd_merge;
mod cmd_scan;
mod cmd_compact;
mod cmd_status;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт - info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();
    if let Err(e) = run() {
        error!("{:?}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Put { path, key, value, value_file } =>
            cmd_put::exec(path, key, value, value_file),

        cli::Cmd::Get { path, key, out } =>
            cmd_get::exec(path, key, out),

        cli::Cmd::Del { path, key } =>
            cmd_del::exec(path, key),

        cli::Cmd::DelRange { path, start, end } =>
            cmd_delrange::exec(path, start, end),

        cli::Cmd::Merge { path, key, operand } =>
            cmd_merge::exec(path, key, operand),

        cli::Cmd::Scan { path, prefix, json } =>
            cmd_scan::exec(path, prefix, json),

        cli::Cmd::Compact { path, start, end, json } =>
            cmd_compact::exec(path, start, end, json),

        cli::Cmd::Status { path, json } =>
            cmd_status::exec(path, json),
    }
}
