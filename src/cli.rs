use clap::{Parser, Subcommand};

/// Command-line options for cleanmail.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Mailbox address (Gmail, Yahoo or any IMAP account)
    #[arg(long, env = "CLEANMAIL_ADDRESS")]
    pub address: Option<String>,

    /// Application password; prefer the environment variable over the flag.
    #[arg(long, env = "CLEANMAIL_APP_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and out to verify the credentials.
    Check,

    /// Count messages per sender.
    Scan {
        /// Print the full result as JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Only show the N biggest senders.
        #[arg(long, default_value_t = 50)]
        top: usize,
    },

    /// Delete every message from the given senders.
    Clean {
        /// Sender address; repeat for several senders.
        #[arg(long = "sender", required = true)]
        senders: Vec<String>,
    },
}
