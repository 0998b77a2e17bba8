//! fixq CLI - failing-test queue
//!
//! Binary name: `fixq`

use std::process;

use fixq::{
    cli::{build_cli, handlers},
    output::error_json,
};
use tracing_subscriber::EnvFilter;

/// Log filter: `-v` flags win, then `FIXQ_LOG`, then `RUST_LOG`, then `warn`.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => std::env::var("FIXQ_LOG")
            .ok()
            .and_then(|value| EnvFilter::try_new(value).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let matches = match build_cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let code = i32::from(err.use_stderr());
            if let Err(print_err) = err.print() {
                #[allow(clippy::print_stderr)]
                {
                    eprintln!("{err}");
                    eprintln!("Error: failed to print usage: {print_err}");
                }
            }
            #[allow(clippy::exit)]
            process::exit(code);
        }
    };

    init_tracing(matches.get_count("verbose"));
    let json = matches.get_flag("json");
    let command = handlers::command_name(&matches);

    match handlers::run(&matches).await {
        Ok(report) => {
            println!("{}", report.render(json));
            #[allow(clippy::exit)]
            process::exit(report.exit_code());
        }
        Err(err) => {
            let code = err
                .downcast_ref::<fixq_core::Error>()
                .map_or(1, fixq_core::Error::exit_code);
            if json {
                println!("{}", error_json(&command, &format!("{err:#}"), code));
            } else {
                #[allow(clippy::print_stderr)]
                {
                    eprintln!("Error: {err:#}");
                }
            }
            #[allow(clippy::exit)]
            process::exit(code);
        }
    }
}
