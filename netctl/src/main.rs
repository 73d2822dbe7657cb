mod cli;

use self::cli::NetctlCmd;
use clap::{crate_version, Parser};
use once_cell::sync::Lazy;
use std::process::ExitCode;

pub fn get_version() -> String {
    match crate_version!() {
        "0.0.0" => "trunk".to_string(),
        version => version.to_string(),
    }
}

static NETCTL_VERSION: Lazy<String> = Lazy::new(get_version);

fn main() -> ExitCode {
    let cmd = NetctlCmd::parse();
    let dev = cmd.dev();
    match cmd.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if dev {
                eprintln!("error: {err:?}");
            } else {
                eprintln!("error: {err}");
            }
            if let Some(log_file) = consortium_o11y::log_file_path() {
                eprintln!("See {} for details.", log_file.display());
            }
            ExitCode::FAILURE
        }
    }
}
