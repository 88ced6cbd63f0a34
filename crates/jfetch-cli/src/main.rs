use jfetch_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // File logging when possible; stderr keeps working in odd environments.
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    match CliCommand::run_from_args().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("jfetch error: {:#}", err);
            std::process::exit(1);
        }
    }
}
