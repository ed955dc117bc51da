mod cli;

use clap::Parser;

use cli::Command;

#[derive(Parser)]
#[command(name = "paracl", version, about = "ParaCL compiler and VM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    cli::dispatch(cli.command);
}
