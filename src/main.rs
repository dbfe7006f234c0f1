mod app;
mod cli;

use clap::Parser;
use cli::Cli;
use colored::Colorize;

fn main() {
    let cli = Cli::parse();
    match app::run(&cli) {
        Ok(should_fail) => {
            if should_fail {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            std::process::exit(2);
        }
    }
}
