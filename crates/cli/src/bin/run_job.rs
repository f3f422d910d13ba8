use anyhow::Result;
use clap::Parser;
use jobhook::{RunJobArgs, init_tracing};
use jobhook_api::{JobsClient, job_id_from_env};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = RunJobArgs::parse();

    let job_id = match args.job_id {
        Some(job_id) => job_id,
        None => job_id_from_env()?,
    };
    let client = JobsClient::new_from_env()?;
    let response = client.run_now(&args.run_now_request(job_id)?).await?;
    match response.run_id {
        Some(run_id) => println!("Started job {job_id}: run_id={run_id}"),
        None => println!("Started job {job_id}"),
    }
    Ok(())
}
