// src/main.rs

use appupdater::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(status) if status.is_failure() => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("appupdater error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<appupdater::report::RunStatus> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
