use std::process;

use p11_cli::commands::p11_main;

fn main() {
    if let Some(err) = p11_main().err() {
        eprintln!("ERROR: {err}");
        process::exit(1);
    }
}
