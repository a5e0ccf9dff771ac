mod cli;
mod shell;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Cs {
            port,
            bind,
            data_dir,
        } => {
            backr::run_cs(backr::CsConfig {
                bind_ip: bind,
                port,
                data_dir,
            })
            .await
        }
        Commands::Bs {
            port,
            cs_host,
            cs_port,
            bind,
            advertise,
            root,
        } => {
            backr::run_bs(backr::BsConfig {
                bind_ip: bind,
                port,
                cs_host: cs_host.unwrap_or_else(|| backr::best_local_ip().to_string()),
                cs_port,
                advertise_ip: advertise,
                root,
            })
            .await
        }
        Commands::Client { cs_host, cs_port } => {
            let host = cs_host.unwrap_or_else(|| backr::best_local_ip().to_string());
            shell::run(host, cs_port).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
