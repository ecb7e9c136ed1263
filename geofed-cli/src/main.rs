//! Entry point for the command-line interface.
#![forbid(unsafe_code)]
#![allow(clippy::print_stderr)]

fn main() {
    if let Err(err) = geofed_cli::run() {
        eprintln!("geofed: {err}");
        std::process::exit(1);
    }
}
