use clap::Parser;

use callview::cli::Cli;

fn main() {
    let cli = Cli::parse();
    std::process::exit(callview::cli::run(cli));
}
