/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text, sent as a user turn.
    Say(String),
    New,
    Sessions,
    /// Session id, or a 1-based position in the last `/sessions` listing.
    Switch(String),
    Delete(Option<String>),
    History,
    Regenerate(usize),
    DeleteFrom(usize),
    Model {
        provider_id: String,
        model_id: Option<String>,
    },
    /// `None` restores the default system prompt.
    System(Option<String>),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  /new                      start a new session
  /sessions                 list recent sessions
  /switch <n|id>            switch to a listed session
  /delete [n|id]            delete a session (default: current)
  /history                  show the current transcript
  /regen <index>            regenerate from an assistant message
  /rm <index>               delete a message and everything after it
  /model <provider> [model] choose the chat model for this session
  /system [prompt]          set or clear the system prompt
  /quit                     exit
Anything else is sent as a message. Ctrl-C stops a reply.";

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg = (!arg.is_empty()).then(|| arg.to_string());

    match name {
        "new" => Command::New,
        "sessions" | "ls" => Command::Sessions,
        "switch" => match arg {
            Some(target) => Command::Switch(target),
            None => Command::Invalid("usage: /switch <n|id>".into()),
        },
        "delete" => Command::Delete(arg),
        "history" => Command::History,
        "regen" => index_arg(arg, "/regen <index>").map_or_else(|e| e, Command::Regenerate),
        "rm" => index_arg(arg, "/rm <index>").map_or_else(|e| e, Command::DeleteFrom),
        "model" => {
            let mut parts = arg.as_deref().unwrap_or_default().split_whitespace();
            match parts.next() {
                Some(provider_id) => Command::Model {
                    provider_id: provider_id.to_string(),
                    model_id: parts.next().map(str::to_string),
                },
                None => Command::Invalid("usage: /model <provider> [model]".into()),
            }
        }
        "system" => Command::System(arg),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("unknown command: /{other} (try /help)")),
    }
}

fn index_arg(arg: Option<String>, usage: &str) -> Result<usize, Command> {
    arg.as_deref()
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| Command::Invalid(format!("usage: {usage}")))
}
