//! This module implements the definition of the command line app.

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Scrapes local Prometheus exporters and pushes their metrics to \
                         Pushgateways, routed by metric name.";

pub fn make_app() -> Command {
    Command::new("prometheus-pusher")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .default_value("/etc/prometheus-pusher")
                .value_parser(ValueParser::path_buf())
                .help("The path to the config file or folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the pusher")
                .after_help(
                    "This runs the pusher in the foreground until it receives SIGINT, SIGQUIT \
                     or SIGTERM. SIGHUP reloads all route maps.",
                )
                .arg(
                    Arg::new("dummy")
                        .long("dummy")
                        .action(ArgAction::SetTrue)
                        .help("Print batches to stdout instead of pushing them."),
                )
                .arg(
                    Arg::new("http_timeout")
                        .long("http-timeout")
                        .value_name("SECS")
                        .help("Timeout of scrape and push requests in seconds."),
                )
                .arg(
                    Arg::new("verbosity")
                        .long("verbosity")
                        .short('v')
                        .value_name("LEVEL")
                        .value_parser(value_parser!(u8))
                        .help("Log verbosity: 0 for errors only, 1 for info, 2 for debug."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the pusher config")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values which are \
                             not in the config file but filled in from defaults and \
                             environment variables.",
                        ),
                ),
        )
        .subcommand(
            Command::new("routes")
                .about("Show the destinations of a metric")
                .after_help(
                    "This loads the route map of a resource and prints the destinations a \
                     metric with the given name is pushed to, one per line.",
                )
                .arg(
                    Arg::new("resource")
                        .value_name("RESOURCE")
                        .required(true)
                        .help("The name of the resource."),
                )
                .arg(
                    Arg::new("metric")
                        .value_name("METRIC")
                        .required(true)
                        .help("The name of the metric."),
                ),
        )
}
