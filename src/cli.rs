//! Command-line surface. The broker takes no subcommands — it is started
//! once by an MCP host and runs until that host disconnects or is
//! signalled — so this only derives `--help`/`--version` and a single
//! diagnostic flag; everything else is configured via the `TASKBROKER_*`
//! environment variables (see `broker_config`).

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "taskbroker",
    about = "MCP broker that dispatches tool calls to isolated code-assistant subprocesses",
    version,
    long_about = None,
)]
pub struct Cli {
    /// Print the resolved configuration (from TASKBROKER_* environment
    /// variables) and exit without starting the server.
    #[arg(long)]
    pub show_config: bool,
}
