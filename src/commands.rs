/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Checkin,
    History,
    /// A `/`-prefixed token that is not in [`COMMANDS`].
    Unknown,
}

/// One row of the command table, shared by dispatch, `/help` and `/setup`.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Token without the leading `/`.
    pub name: &'static str,
    pub description: &'static str,
    pub command: Command,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        description: "Show the welcome message",
        command: Command::Start,
    },
    CommandSpec {
        name: "help",
        description: "List available commands",
        command: Command::Help,
    },
    CommandSpec {
        name: "status",
        description: "Show account balances",
        command: Command::Status,
    },
    CommandSpec {
        name: "checkin",
        description: "Trigger a check-in run now",
        command: Command::Checkin,
    },
    CommandSpec {
        name: "history",
        description: "Show the last 5 check-ins",
        command: Command::History,
    },
];

pub const START_TEXT: &str = "👋 <b>Welcome!</b>\n\n\
    I relay check-in commands to the automation workflow and report account balances.\n\n\
    Send /help to see what I can do.";

pub const HELP_TEXT: &str = "<b>📖 Commands</b>\n\n\
    /status - Show account balances\n\
    /checkin - Trigger a check-in run now\n\
    /history - Show the last 5 check-ins\n\
    /help - List available commands";

pub const UNKNOWN_COMMAND_TEXT: &str = "❓ Unknown command. Send /help to see available commands.";

impl Command {
    /// Classify a message. `None` means ordinary chat text that gets no reply.
    ///
    /// Only the first whitespace-delimited token counts, compared
    /// case-insensitively; a `@botname` suffix is ignored.
    pub fn parse(text: &str) -> Option<Command> {
        let token = text.split_whitespace().next()?.to_lowercase();
        let token = token.split('@').next().unwrap_or_default();
        let name = token.strip_prefix('/')?;

        Some(
            COMMANDS
                .iter()
                .find(|spec| spec.name == name)
                .map(|spec| spec.command)
                .unwrap_or(Command::Unknown),
        )
    }
}
