//! CLI command definitions

use clap::{Parser, Subcommand};
use kage_control::api::ReportSection;

#[derive(Parser)]
#[command(name = "kage")]
#[command(about = "KageControl restaurant operations client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend REST base URL
    #[arg(long, env = "KAGE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// WebSocket base URL (derived from the API URL when unset)
    #[arg(long, env = "KAGE_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// File holding the persisted credential
    #[arg(long, env = "KAGE_STORE", global = true, default_value = "~/.kage/storage.json")]
    pub store: String,

    /// Fixed delay between reconnect attempts, in milliseconds
    #[arg(long, env = "KAGE_RECONNECT_MS", global = true)]
    pub reconnect_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and persist the credential
    Login {
        username: String,

        /// Read from stdin when omitted
        #[arg(long, env = "KAGE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the persisted credential
    Logout,

    /// Show the identity carried by the persisted credential
    Whoami,

    /// Show the menu of the logged-in role
    Menu,

    /// Check whether a dashboard route would render
    ///
    /// Examples:
    ///   kage check /admin/reportes
    ///   kage check /
    Check {
        path: String,
    },

    /// GET an API path and print the JSON answer
    ///
    /// Examples:
    ///   kage get /tables
    ///   kage get /orders/tracking
    Get {
        path: String,
    },

    /// Update the status of an order
    OrderStatus {
        order_id: i64,
        status: String,
    },

    /// Download the PDF report for a date range
    ///
    /// Examples:
    ///   kage report 2024-05-01 2024-05-31 -s ordenes -s comensales -o mayo.pdf
    Report {
        start: String,
        end: String,

        /// Sections to include: reservas, ordenes, comensales (default: all)
        #[arg(short, long = "section", value_parser = parse_section)]
        sections: Vec<ReportSection>,

        /// Output file
        #[arg(short, long, default_value = "reporte.pdf")]
        out: String,
    },

    /// Print live notifications until interrupted
    Watch {
        /// Follow table updates instead of order notifications
        #[arg(long)]
        tables: bool,

        /// Give up after this many consecutive failed attempts
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

fn parse_section(s: &str) -> Result<ReportSection, String> {
    ReportSection::parse(s).ok_or_else(|| {
        format!("Invalid section: {}. Must be reservas, ordenes, or comensales", s)
    })
}
