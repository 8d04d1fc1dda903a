use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use fanout_core::{ExecutionMode, MapperConfig};

pub(super) fn root_cli() -> Command {
    Command::new("fanout")
        .author("Fanout Authors")
        .about("Maps asynchronous work over a list of items with bounded concurrency")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_demo_subcommand())
        .subcommand(add_fetch_subcommand())
}

fn limit_arg() -> Arg {
    Arg::new("limit")
        .long("limit")
        .short('l')
        .value_parser(value_parser!(usize))
        .help("Maximum number of operations in flight (overrides FANOUT_CONCURRENCY)")
}

fn spawned_arg() -> Arg {
    Arg::new("spawned")
        .long("spawned")
        .action(ArgAction::SetTrue)
        .help("Run every operation as its own task (overrides FANOUT_MODE)")
}

fn add_demo_subcommand() -> Command {
    Command::new("demo")
        .about("Doubles 1..=N after a delay, showing how many operations run at once")
        .arg(limit_arg())
        .arg(spawned_arg())
        .arg(
            Arg::new("items")
                .long("items")
                .short('n')
                .value_parser(value_parser!(u64))
                .default_value("5"),
        )
        .arg(
            Arg::new("delay-ms")
                .long("delay-ms")
                .value_parser(value_parser!(u64))
                .default_value("100"),
        )
        .arg(
            Arg::new("fail-at")
                .long("fail-at")
                .value_parser(value_parser!(usize))
                .help("Index of the item whose operation fails"),
        )
        .arg(
            Arg::new("callback")
                .long("callback")
                .action(ArgAction::SetTrue)
                .help("Run the operation as a callback-style timer bridged into a future"),
        )
}

fn add_fetch_subcommand() -> Command {
    Command::new("fetch")
        .about("Fetches JSON documents, a bounded number at a time")
        .arg(limit_arg())
        .arg(spawned_arg())
        .arg(
            Arg::new("urls")
                .required(true)
                .num_args(1..)
                .value_name("URL"),
        )
}

/// Applies the command line overrides on top of the loaded configuration.
pub(super) fn mapper_config(args: &ArgMatches, mut cfg: MapperConfig) -> MapperConfig {
    if let Some(limit) = args.get_one::<usize>("limit") {
        cfg.concurrency = *limit;
    }
    if args.get_flag("spawned") {
        cfg.mode = ExecutionMode::Spawned;
    }
    cfg
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct DemoArgs {
    pub items: u64,
    pub delay: Duration,
    pub fail_at: Option<usize>,
    pub callback: bool,
}

impl From<&ArgMatches> for DemoArgs {
    fn from(args: &ArgMatches) -> Self {
        DemoArgs {
            items: args.get_one::<u64>("items").copied().unwrap_or(5),
            delay: Duration::from_millis(args.get_one::<u64>("delay-ms").copied().unwrap_or(100)),
            fail_at: args.get_one::<usize>("fail-at").copied(),
            callback: args.get_flag("callback"),
        }
    }
}

pub(super) fn urls(args: &ArgMatches) -> Vec<String> {
    args.get_many::<String>("urls")
        .map(|urls| urls.cloned().collect())
        .unwrap_or_default()
}
