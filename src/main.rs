use std::process;

use anyhow::{self, format_err};
use clap::Parser;

use csm2::interfaces::cli::{log_heading, setup_logger, Cli};
use csm2::interfaces::input::Input;
use csm2::interfaces::InputHandle;
use csm2::io::read_csm2_yaml;

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    setup_logger(cli.output.as_deref(), cli.verbose)?;
    log_heading();
    let inp = read_csm2_yaml::<Input, _>(&cli.config)
        .map_err(|err| format_err!("Unable to read {}: {err}", cli.config.display()))?;
    inp.handle()
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
