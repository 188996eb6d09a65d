mod cli;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Hash(args) => run::hash(args),
        Command::Dump(args) => run::dump(args),
        Command::Compile(args) => run::compile(args),
        Command::Decompile(args) => run::decompile(args),
        Command::Config(args) => run::config(args),
        Command::Where => run::show_paths(),
    }
}
