use colored::Colorize;
use commands::command_argument_builder;
use cooked::handlers::{
    handle_crawl_leader, handle_crawl_worker, handle_explore, handle_leader, handle_traverse, handle_worker,
    init_logging, print_banner,
};

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    init_logging(chosen_command.get_flag("verbose"));

    let outcome = match chosen_command.subcommand() {
        Some(("traverse", primary_command)) => handle_traverse(primary_command).await,
        Some(("explore", primary_command)) => handle_explore(primary_command).await,
        Some(("leader", primary_command)) => handle_leader(primary_command).await,
        Some(("worker", primary_command)) => handle_worker(primary_command).await,
        Some(("crawl-leader", primary_command)) => handle_crawl_leader(primary_command).await,
        Some(("crawl-worker", primary_command)) => handle_crawl_worker(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
