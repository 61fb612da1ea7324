use logos::Logos;
use std::fmt;

use crate::error::{ReplError, Result};

#[derive(Debug, Logos, PartialEq, Eq, Clone, Copy)]
#[logos(skip r"[ \t]+")]
pub enum CommandToken {
    #[token(":")]
    Colon,

    #[token("=")]
    Equals,

    #[token(",")]
    Comma,

    #[regex(r"[^ \t:=,]+")]
    Word,
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandToken::Colon => write!(f, ":"),
            CommandToken::Equals => write!(f, "="),
            CommandToken::Comma => write!(f, ","),
            CommandToken::Word => write!(f, "word"),
        }
    }
}

/// A session command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { name: String, value: String },
    Unset(String),
    Sync(bool),
    Encode(bool),
    Collect(bool),
    /// `None` lifts the restriction.
    Allow(Option<Vec<String>>),
    Names(String),
    Settings,
    Help,
    History,
    Clear,
    Exit,
}

impl Command {
    pub const USAGE: &'static [(&'static str, &'static str)] = &[
        (":set NAME=value", "Bind NAME for this session"),
        (":unset NAME", "Remove a session binding"),
        (":sync on|off", "Resolve without awaiting async macros"),
        (":encode on|off", "Percent-encode top level results"),
        (":collect on|off", "Print what every macro resolved to"),
        (":allow A,B|none", "Only expand the listed macros"),
        (":names <template>", "List the macros found in a template"),
        (":settings", "Show the session settings"),
        (":help", "Show this help message"),
        (":history", "Show expanded templates"),
        (":clear", "Clear the screen"),
        (":exit, :quit", "Exit the REPL"),
    ];
}

struct CommandLexer<'a> {
    source: &'a str,
    lexer: logos::SpannedIter<'a, CommandToken>,
}

impl<'a> CommandLexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            lexer: CommandToken::lexer(source).spanned(),
        }
    }

    fn next_token(&mut self) -> Option<(CommandToken, &'a str, usize)> {
        let source = self.source;
        self.lexer.next().map(|(token, span)| {
            let token = token.unwrap_or(CommandToken::Word);
            (token, &source[span.clone()], span.end)
        })
    }

    fn expect_word(&mut self, usage: &'static str) -> Result<&'a str> {
        match self.next_token() {
            Some((CommandToken::Word, text, _)) => Ok(text),
            _ => Err(ReplError::Usage(usage)),
        }
    }

    /// Everything after byte offset `from`, untokenized.
    fn rest(&self, from: usize) -> &'a str {
        let source = self.source;
        source[from..].trim()
    }
}

/// Whether `line` is a session command rather than a template.
pub fn is_command(line: &str) -> bool {
    line.trim_start().starts_with(':')
}

pub fn parse(line: &str) -> Result<Command> {
    let mut lexer = CommandLexer::new(line.trim());
    if !matches!(lexer.next_token(), Some((CommandToken::Colon, _, _))) {
        return Err(ReplError::UnknownCommand(line.trim().to_string()));
    }
    let (name, name_end) = match lexer.next_token() {
        Some((CommandToken::Word, text, end)) => (text, end),
        _ => return Err(ReplError::UnknownCommand(line.trim().to_string())),
    };

    tracing::debug!("Parsing command: {}", name);
    let command = match name {
        "set" => {
            let usage = "Usage: :set NAME=value";
            let binding = lexer.expect_word(usage)?;
            match lexer.next_token() {
                Some((CommandToken::Equals, _, end)) => Command::Set {
                    name: binding.to_string(),
                    value: lexer.rest(end).to_string(),
                },
                _ => return Err(ReplError::Usage(usage)),
            }
        }
        "unset" => Command::Unset(lexer.expect_word("Usage: :unset NAME")?.to_string()),
        "sync" => Command::Sync(toggle(lexer.rest(name_end))?),
        "encode" => Command::Encode(toggle(lexer.rest(name_end))?),
        "collect" => Command::Collect(toggle(lexer.rest(name_end))?),
        "allow" => {
            let mut names = Vec::new();
            while let Some((token, text, _)) = lexer.next_token() {
                match token {
                    CommandToken::Word => names.push(text.to_string()),
                    CommandToken::Comma => {}
                    _ => return Err(ReplError::Usage("Usage: :allow A,B|none")),
                }
            }
            match names.as_slice() {
                [] => return Err(ReplError::Usage("Usage: :allow A,B|none")),
                [none] if none == "none" => Command::Allow(None),
                _ => Command::Allow(Some(names)),
            }
        }
        "names" => Command::Names(lexer.rest(name_end).to_string()),
        "settings" => Command::Settings,
        "help" => Command::Help,
        "history" => Command::History,
        "clear" => Command::Clear,
        "exit" | "quit" => Command::Exit,
        other => return Err(ReplError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

fn toggle(value: &str) -> Result<bool> {
    match value {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        other => Err(ReplError::InvalidToggle(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keeps_raw_value() {
        assert_eq!(
            parse(":set CLIENT_ID = abc def:1").unwrap(),
            Command::Set {
                name: "CLIENT_ID".to_string(),
                value: "abc def:1".to_string(),
            }
        );
    }

    #[test]
    fn test_toggles() {
        assert_eq!(parse(":sync on").unwrap(), Command::Sync(true));
        assert_eq!(parse(":encode false").unwrap(), Command::Encode(false));
        assert!(matches!(parse(":collect maybe"), Err(ReplError::InvalidToggle(_))));
    }

    #[test]
    fn test_allow_lists() {
        assert_eq!(
            parse(":allow FOO, BAR").unwrap(),
            Command::Allow(Some(vec!["FOO".to_string(), "BAR".to_string()]))
        );
        assert_eq!(parse(":allow none").unwrap(), Command::Allow(None));
        assert!(parse(":allow").is_err());
    }

    #[test]
    fn test_names_takes_the_template() {
        assert_eq!(
            parse(":names a=FOO(x,y)&b=BAR").unwrap(),
            Command::Names("a=FOO(x,y)&b=BAR".to_string())
        );
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(parse(":frobnicate"), Err(ReplError::UnknownCommand(_))));
        assert!(is_command("  :help"));
        assert!(!is_command("FOO(:x)"));
    }
}
