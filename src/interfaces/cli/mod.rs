//! Command-line interface of CSM².

use std::path::{Path, PathBuf};

use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::io::format::csm2_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted CSM2 heading to the `csm2-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    csm2_output!("╭─────────────────────────────────────────────────────────────────────────────────────────────────────╮");
    csm2_output!("│                                                                         222222222222222             │");
    csm2_output!("│                                                                        2:::::::::::::::22           │");
    csm2_output!("│        CCCCCCCCCCCCC   SSSSSSSSSSSSSSS                                 2::::::222222:::::2          │");
    csm2_output!("│     CCC::::::::::::C SS:::::::::::::::S                                2222222     2:::::2          │");
    csm2_output!("│   CC:::::::::::::::CS:::::SSSSSS::::::S                                            2:::::2          │");
    csm2_output!("│  C:::::CCCCCCCC::::CS:::::S     SSSSSSS                                       22222::::::22         │");
    csm2_output!("│ C:::::C       CCCCCCS:::::S             mmmmmmm    mmmmmmm                  22::::::::222           │");
    csm2_output!("│C:::::C              S::::SSSS        mm:::::::m  m:::::::mm               2:::::22222               │");
    csm2_output!("│C:::::C               SS::::::SSSSS  m::::::::::mm::::::::::m             2:::::2                    │");
    csm2_output!("│C:::::C                 SSS::::::::SSm::::::::::::::::::::::m             2:::::2       222222       │");
    csm2_output!("│C:::::C                    SSSSSS::::Sm:::::mmm::::::mmm:::::m            2::::::2222222:::::2       │");
    csm2_output!("│ C:::::C       CCCCCC           S:::::Sm::::m   m::::m   m::::m            2::::::::::::::::::2      │");
    csm2_output!("│  C:::::CCCCCCCC::::CSSSSSSS     S:::::Sm::::m   m::::m   m::::m           22222222222222222222      │");
    csm2_output!("│   CC:::::::::::::::CS::::::SSSSSS:::::Sm::::m   m::::m   m::::m                                     │");
    csm2_output!("│     CCC::::::::::::CS:::::::::::::::SS m::::m   m::::m   m::::m                                     │");
    csm2_output!("│        CCCCCCCCCCCCC SSSSSSSSSSSSSSS   mmmmmm   mmmmmm   mmmmmm                                     │");
    csm2_output!("│                                                                                                     │");
    csm2_output!("│                                 Exact Continuous Symmetry Measures                    {version:>13} │");
    csm2_output!("╰─────────────────────────────────────────────────────────────────────────────────────────────────────╯");
    csm2_output!("");
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// The YAML configuration file specifying the molecule and the calculation.
    #[arg(short, long)]
    pub config: PathBuf,

    /// The file to which the main output is written, in addition to the console.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Use verbose diagnostic output. May be specified twice for very verbose output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Configures `log4rs` so that the `csm2-output` target is written to standard output, and
/// optionally to a file, while diagnostics go to standard error.
///
/// # Arguments
///
/// * `output` - An optional file to which the `csm2-output` target is also written.
/// * `verbose` - The verbosity level of the diagnostics: `0` for warnings, `1` for
/// information, `2` or above for debugging messages.
pub fn setup_logger(output: Option<&Path>, verbose: u8) -> Result<(), anyhow::Error> {
    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{l}] {t}: {m}{n}")))
        .build();

    let mut output_appenders = vec!["csm2-stdout".to_string()];
    let mut builder = Config::builder()
        .appender(Appender::builder().build("csm2-stdout", Box::new(stdout)))
        .appender(Appender::builder().build("stderr", Box::new(stderr)));
    if let Some(path) = output {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .append(false)
            .build(path)
            .map_err(|err| format_err!("Unable to create {}: {err}", path.display()))?;
        builder = builder.appender(Appender::builder().build("csm2-file", Box::new(file)));
        output_appenders.push("csm2-file".to_string());
    }

    let root_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let config = builder
        .logger(
            Logger::builder()
                .appenders(output_appenders)
                .additive(false)
                .build("csm2-output", LevelFilter::Info),
        )
        .build(Root::builder().appender("stderr").build(root_level))
        .map_err(|err| format_err!(err))?;
    log4rs::init_config(config).map_err(|err| format_err!(err))?;
    Ok(())
}
