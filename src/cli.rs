use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bulkman",
    version,
    about = "Sort bulk mail by sender over JMAP: scan, move, and install filter rules"
)]
pub struct Cli {
    /// Output JSON to stdout (default).
    #[arg(long, global = true, conflicts_with = "plain")]
    pub json: bool,

    /// Output stable plain text (tab-separated).
    #[arg(long, global = true, conflicts_with = "json")]
    pub plain: bool,

    /// Describe what move/rule would do without contacting the server.
    #[arg(long, global = true, visible_alias = "dry-run")]
    pub preview: bool,

    /// Skip confirmations for move/rule.
    #[arg(long, global = true)]
    pub force: bool,

    /// Never prompt; fail instead.
    #[arg(long, global = true)]
    pub no_input: bool,

    /// Choose a configured account (when multiple).
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Bulk folder name, used when no mailbox has the junk role.
    #[arg(long, global = true)]
    pub folder: Option<String>,

    /// Verbose logging on stderr.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authenticate and resolve the bulk folder.
    Connect,

    /// List all mailboxes.
    Mailboxes,

    /// Group recent bulk-folder messages by sender.
    Scan(ScanArgs),

    /// Recent bulk-folder messages from one sender.
    Messages(MessagesArgs),

    /// Move all of a sender's messages into the bulk folder.
    Move(SendersArgs),

    /// Add a filter rule that files a sender's future mail into the bulk folder.
    Rule(SendersArgs),

    /// Config file operations.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Credential helpers.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Look back this many days (default 7).
    #[arg(long)]
    pub days: Option<u32>,

    /// Treat sender addresses case-insensitively when grouping.
    #[arg(long)]
    pub fold_case: bool,
}

#[derive(Args, Debug)]
pub struct MessagesArgs {
    #[arg(value_name = "SENDER")]
    pub sender: String,

    #[command(flatten)]
    pub scan: ScanArgs,
}

#[derive(Args, Debug)]
pub struct SendersArgs {
    /// One sender for a single action, several for a bulk action.
    #[arg(value_name = "SENDER", required = true, num_args = 1..)]
    pub senders: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Create a minimal config file if none exists.
    Init,

    /// Show the config file (secrets removed).
    Show(ConfigShowArgs),

    /// Set the default account.
    SetDefault(ConfigSetDefaultArgs),
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Show the resolved runtime settings instead of the file.
    #[arg(long)]
    pub effective: bool,
}

#[derive(Args, Debug)]
pub struct ConfigSetDefaultArgs {
    pub account: String,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Store an app password in a private file and point the account at it.
    SetPassword(AuthSetPasswordArgs),
}

#[derive(Args, Debug)]
pub struct AuthSetPasswordArgs {
    pub password: String,

    /// Login user to record alongside the password.
    #[arg(long)]
    pub user: Option<String>,
}
