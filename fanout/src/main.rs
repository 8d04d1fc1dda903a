use std::error::Error;

use fanout_core::MapperConfig;
use tracing::{error, info};

mod cmdline;
mod demo;
mod fetch;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let matches = cmdline::root_cli().get_matches();
    let base = MapperConfig::load()?;

    match matches.subcommand() {
        Some(("demo", args)) => {
            let cfg = cmdline::mapper_config(args, base);
            demo::run(&cfg, cmdline::DemoArgs::from(args)).await?;
        }
        Some(("fetch", args)) => {
            let cfg = cmdline::mapper_config(args, base);
            fetch::run(&cfg, cmdline::urls(args)).await?;
        }
        Some((name, _)) => return Err(format!("unknown subcommand {name}").into()),
        None => return Err("no subcommand given".into()),
    }

    Ok(())
}
