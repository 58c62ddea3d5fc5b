use serde_json::Value;

use crate::actions::ActionKind;
use crate::cli::*;
use crate::config::{self, Overrides, ResolvedRuntimeConfig};
use crate::error::BulkError;
use crate::output::Envelope;
use crate::toolkit::{TOOL_NAME, Toolkit};

mod act;
mod auth_cmd;
mod config_cmd;
mod mail;

/// Global flags every command may consult.
pub struct Ctx<'a> {
    pub cli: &'a Cli,
    pub toolkit: Toolkit,
}

impl Ctx<'_> {
    pub fn account(&self) -> Option<String> {
        self.cli.account.clone()
    }

    pub fn resolve(&self, days: Option<u32>) -> Result<ResolvedRuntimeConfig, BulkError> {
        config::resolve_runtime_config(&Overrides {
            account: self.cli.account.clone(),
            folder: self.cli.folder.clone(),
            days,
        })
    }
}

pub async fn dispatch(cli: &Cli) -> Envelope<Value> {
    let toolkit = Toolkit::new();
    toolkit.register_tool(TOOL_NAME);
    let ctx = Ctx { cli, toolkit };

    match &cli.command {
        Command::Connect => mail::connect(&ctx).await,
        Command::Mailboxes => mail::mailboxes(&ctx).await,
        Command::Scan(args) => mail::scan(&ctx, args).await,
        Command::Messages(args) => mail::messages(&ctx, args).await,
        Command::Move(args) => act::run(&ctx, ActionKind::Move, args).await,
        Command::Rule(args) => act::run(&ctx, ActionKind::Rule, args).await,

        Command::Config { command: sub } => match sub {
            ConfigCommand::Init => config_cmd::init(),
            ConfigCommand::Show(args) => config_cmd::show(&ctx, args),
            ConfigCommand::SetDefault(args) => config_cmd::set_default(args),
        },
        Command::Auth {
            command: AuthCommand::SetPassword(args),
        } => auth_cmd::set_password(ctx.cli.account.as_deref(), args),
    }
}
