#![doc(hidden)]

use clap::Parser;

/// Arguments for the `infperf` load-testing CLI.
#[derive(Parser, Debug)]
#[command(version, about = "Closed-loop load-testing harness for OpenAI-compatible inference servers")]
pub struct Args {
    #[clap(
        short = 'c',
        long,
        value_name = "FILE",
        help = "Path to the YAML config to run (merged over built-in defaults)"
    )]
    pub config: String,

    #[clap(
        long,
        help = "Validate and print the merged config without starting a run",
        default_value_t = false
    )]
    pub dry_run: bool,

    #[clap(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Don't print any messages except for errors",
        default_value_t = false
    )]
    pub quiet: bool,

    #[clap(
        short = 'v',
        long,
        conflicts_with = "quiet",
        action = clap::ArgAction::Count,
        help = "Output details about scheduling and worker activity; specify multiple times for more detail"
    )]
    pub verbose: u8,
}
