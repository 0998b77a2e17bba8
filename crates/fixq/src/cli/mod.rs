pub mod handlers;

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("fixq")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Queue failing tests, plan their execution and drive automated repairs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("Queue database (overrides config and FIXQ_DATABASE)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("Config file to use instead of .fixq/config.toml"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print exactly one JSON object"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Raise log verbosity (repeatable)"),
        )
        .subcommand(cmd_enqueue())
        .subcommand(Command::new("dequeue").about("Remove and print the next failing test"))
        .subcommand(Command::new("peek").about("Print the next failing test without removing it"))
        .subcommand(Command::new("list").about("List queued tests in dequeue order"))
        .subcommand(
            Command::new("remove")
                .about("Remove a test from the queue")
                .arg(file_arg()),
        )
        .subcommand(Command::new("clear").about("Remove every queued test"))
        .subcommand(Command::new("size").about("Print the number of queued tests"))
        .subcommand(
            Command::new("contains")
                .about("Check whether a test is queued")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("search")
                .about("List queued tests whose path contains PATTERN")
                .arg(Arg::new("pattern").required(true).value_name("PATTERN")),
        )
        .subcommand(Command::new("stats").about("Show queue statistics"))
        .subcommand(cmd_groups())
        .subcommand(cmd_scan())
        .subcommand(cmd_fix())
}

fn file_arg() -> Arg {
    Arg::new("file")
        .required(true)
        .value_name("FILE")
        .help("Test file path; relative paths resolve against the current directory")
}

fn priority_arg() -> Arg {
    Arg::new("priority")
        .long("priority")
        .short('p')
        .value_name("N")
        .allow_negative_numbers(true)
        .value_parser(value_parser!(i64))
        .help("Priority, higher dequeues first [default: scan.default_priority]")
}

fn cmd_enqueue() -> Command {
    Command::new("enqueue")
        .about("Add a failing test, or record another failure of a queued one")
        .arg(file_arg())
        .arg(priority_arg())
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("TEXT")
                .help("Diagnostic text to store with the test"),
        )
}

fn cmd_groups() -> Command {
    Command::new("groups")
        .about("Manage execution groups")
        .subcommand_required(true)
        .subcommand(
            Command::new("set")
                .about("Replace all groups; each GROUP is a comma-separated list of files")
                .arg(
                    Arg::new("groups")
                        .required(true)
                        .num_args(1..)
                        .value_name("GROUP"),
                ),
        )
        .subcommand(
            Command::new("set-advanced")
                .about("Apply a JSON plan of {groupId, type, tests, order} entries")
                .arg(
                    Arg::new("plan")
                        .required(true)
                        .value_name("PLAN_JSON | @FILE"),
                ),
        )
        .subcommand(Command::new("next").about("Show the next group without removing it"))
        .subcommand(Command::new("peek").about("Show the next group without removing it"))
        .subcommand(Command::new("dequeue").about("Remove the next group and print its tests"))
        .subcommand(Command::new("clear").about("Drop all grouping, keep the queue"))
        .subcommand(Command::new("stats").about("Show group counts"))
        .subcommand(Command::new("has").about("Check whether any group has queued tests"))
}

fn cmd_scan() -> Command {
    Command::new("scan")
        .about("Run the test suite and enqueue every failing file")
        .arg(
            Arg::new("command")
                .long("command")
                .value_name("CMD")
                .help("Test command [default: scan.command or the framework default]"),
        )
        .arg(
            Arg::new("framework")
                .long("framework")
                .value_name("NAME")
                .help("auto, pytest, jest, go or cargo [default: scan.framework]"),
        )
        .arg(priority_arg())
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("Project root [default: current directory]"),
        )
}

fn cmd_fix() -> Command {
    Command::new("fix")
        .about("Run repair attempts on queued tests until the queue drains")
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Stop after N attempts"),
        )
}
