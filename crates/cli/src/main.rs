use std::process::ExitCode;

use clap::Parser;
use jobhook::{TriggerArgs, call_run, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = TriggerArgs::parse();

    match call_run(&args.url, &args.id).await {
        Ok(body) => {
            println!("Response: {body}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}
