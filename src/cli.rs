use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// The command line interface for the serial bridge.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// The port to serve HTTP on (overrides the PORT environment variable)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON request for opening a port.
    OpenRequest,

    /// Show an example JSON request for sending a line.
    SendRequest,
}

/// Print the requested example.
pub fn handle_command(command: Commands) {
    let Commands::Examples(example) = command;

    match example {
        Examples::Config => println!("{}", Config::example().serialize_pretty()),
        Examples::OpenRequest => println!(
            "{}",
            serde_json::json!({ "path": "/dev/ttyACM0", "baud": 115200 })
        ),
        Examples::SendRequest => {
            println!("{}", serde_json::json!({ "payload": "step 100" }))
        }
    }
}
