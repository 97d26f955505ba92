use crate::CLAP_STYLING;
use clap::{arg, command};
use cooked_core::OptChoice;
use std::path::PathBuf;
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("cooked")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("cooked")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and progress output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log at debug level (RUST_LOG overrides)")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("traverse")
                .about(
                    "Discover same-site pages for every site in a ranked list and write the \
                group corpus.",
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(true)
                        .help("Ranked site list, one 'rank,site' row per line"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(true)
                        .help("Corpus file to append site groups to (JSON lines)"),
                )
                .arg(
                    arg!(-n --"count" <NUM_PAGES>)
                        .required(false)
                        .help("Internal pages to discover per site")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("15"),
                )
                .arg(
                    arg!(-b --"batch-size" <NUM_SITES>)
                        .required(false)
                        .help("Sites traversed concurrently per batch")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Probe and page load timeout")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5"),
                )
                .arg(
                    arg!(--"checkpoint" <PATH>)
                        .required(false)
                        .help("Completed-batch log (default: <output>.checkpoint)"),
                )
                .arg(
                    arg!(--"resume")
                        .required(false)
                        .help("Skip batches already recorded in the checkpoint and append to the corpus")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"seed" <SEED>)
                        .required(false)
                        .help("Seed frontier selection for reproducible runs")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            command!("explore")
                .about("Explore a single site from a start URL and print the internal pages found")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("Start URL")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-n --"count" <NUM_PAGES>)
                        .required(false)
                        .help("Internal pages to discover")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("15"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Page load timeout")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5"),
                )
                .arg(
                    arg!(--"seed" <SEED>)
                        .required(false)
                        .help("Seed frontier selection for reproducible runs")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the pages as a JSON array")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("leader")
                .about("Serve a group corpus to workers and write their results")
                .arg(
                    arg!(-c --"corpus" <PATH>)
                        .required(true)
                        .help("Corpus file produced by 'traverse'")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-o --"output-dir" <PATH>)
                        .required(false)
                        .help("Directory for per-site result files")
                        .default_value("resultsIn"),
                )
                .arg(
                    arg!(-m --"mode" <MODE>)
                        .required(false)
                        .help("Consent mode, used in result file names: optIn or optOut")
                        .value_parser(clap::value_parser!(OptChoice))
                        .default_value("optIn"),
                )
                .arg(
                    arg!(--"bind" <ADDR>)
                        .required(false)
                        .help("Address to listen on")
                        .default_value("0.0.0.0"),
                )
                .arg(
                    arg!(--"dispatch-port" <PORT>)
                        .required(false)
                        .help("Dispatch channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56301"),
                )
                .arg(
                    arg!(--"result-port" <PORT>)
                        .required(false)
                        .help("Result channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56302"),
                )
                .arg(
                    arg!(--"advertise-output-dir")
                        .required(false)
                        .help("Send the output directory with every dispatched group")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("worker")
                .about("Pull site groups from a leader, visit them and report the cookies set")
                .arg(
                    arg!(-l --"leader" <HOST>)
                        .required(false)
                        .help("Leader host name or address")
                        .default_value("127.0.0.1"),
                )
                .arg(
                    arg!(--"dispatch-port" <PORT>)
                        .required(false)
                        .help("Leader dispatch channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56301"),
                )
                .arg(
                    arg!(--"result-port" <PORT>)
                        .required(false)
                        .help("Leader result channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56302"),
                )
                .arg(
                    arg!(-m --"mode" <MODE>)
                        .required(false)
                        .help("Consent choice sent to the extension: optIn or optOut")
                        .value_parser(clap::value_parser!(OptChoice))
                        .default_value("optIn"),
                )
                .arg(
                    arg!(--"bridge-port" <PORT>)
                        .required(false)
                        .help("Local port the consent extension connects to")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("5630"),
                )
                .arg(
                    arg!(--"no-bridge")
                        .required(false)
                        .help("Do not wait for extension reports")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"page-timeout" <SECONDS>)
                        .required(false)
                        .help("Page load timeout")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"report-timeout" <SECONDS>)
                        .required(false)
                        .help("How long to wait for the extension's report on each page")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"settle-ms" <MILLIS>)
                        .required(false)
                        .help("Pause after each page")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("1000"),
                ),
        )
        .subcommand(
            command!("crawl-leader")
                .about("Hand out ranked sites to crawl workers and append the groups they find to a corpus")
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(true)
                        .help("Ranked site list, one 'rank,site' row per line"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Corpus file to append site groups to (JSON lines)")
                        .default_value("results/internal_links.jsonl"),
                )
                .arg(
                    arg!(--"resume")
                        .required(false)
                        .help("Keep the existing corpus and skip the sites it already holds")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"bind" <ADDR>)
                        .required(false)
                        .help("Address to listen on")
                        .default_value("0.0.0.0"),
                )
                .arg(
                    arg!(--"dispatch-port" <PORT>)
                        .required(false)
                        .help("Site dispatch channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56303"),
                )
                .arg(
                    arg!(--"result-port" <PORT>)
                        .required(false)
                        .help("Group result channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56304"),
                ),
        )
        .subcommand(
            command!("crawl-worker")
                .about("Pull sites from a crawl leader, discover their internal pages and report them")
                .arg(
                    arg!(-l --"leader" <HOST>)
                        .required(false)
                        .help("Crawl leader host name or address")
                        .default_value("127.0.0.1"),
                )
                .arg(
                    arg!(--"dispatch-port" <PORT>)
                        .required(false)
                        .help("Crawl leader dispatch channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56303"),
                )
                .arg(
                    arg!(--"result-port" <PORT>)
                        .required(false)
                        .help("Crawl leader result channel port")
                        .value_parser(clap::value_parser!(u16))
                        .default_value("56304"),
                )
                .arg(
                    arg!(-n --"count" <NUM_PAGES>)
                        .required(false)
                        .help("Internal pages to discover per site")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("15"),
                )
                .arg(
                    arg!(--"max-workers" <NUM_TASKS>)
                        .required(false)
                        .help("Sites traversed concurrently")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Probe and page load timeout")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5"),
                )
                .arg(
                    arg!(--"seed" <SEED>)
                        .required(false)
                        .help("Seed frontier selection for reproducible runs")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
}
