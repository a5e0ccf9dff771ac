use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Runs the central server.
    Cs {
        /// Port shared by the control and session planes.
        #[arg(short = 'p', long, default_value_t = backr::DEFAULT_CS_PORT)]
        port: u16,

        /// Address to bind both planes on.
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Directory the durable snapshots live in.
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
    },

    /// Runs a backup server.
    Bs {
        /// Port shared by the control and session planes.
        #[arg(short = 'b', long, default_value_t = backr::DEFAULT_BS_PORT)]
        port: u16,

        /// Central server host; the local best IP when omitted.
        #[arg(short = 'n', long)]
        cs_host: Option<String>,

        /// Central server port.
        #[arg(short = 'p', long, default_value_t = backr::DEFAULT_CS_PORT)]
        cs_port: u16,

        /// Address to bind both planes on.
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Address announced to the central server; derived from the route
        /// towards it when omitted.
        #[arg(long)]
        advertise: Option<IpAddr>,

        /// Root of the user directory tree.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Starts the interactive client shell.
    Client {
        /// Central server host; the local best IP when omitted.
        #[arg(short = 'n', long)]
        cs_host: Option<String>,

        /// Central server port.
        #[arg(short = 'p', long, default_value_t = backr::DEFAULT_CS_PORT)]
        cs_port: u16,
    },
}
