use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};
use std::collections::{BTreeMap, HashSet};
use tokio::runtime::Runtime;
use tracing::Instrument;
use urlmacro_core::{Bindings, CollectedVars, ExpandParams, Expander, Registry, UrlReplacements};

use crate::command::{self, Command};
use crate::error::Result;
use crate::variables;

/// Session wide settings changed with `:` commands.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sync: bool,
    pub encode: bool,
    pub collect: bool,
    pub allowlist: Option<HashSet<String>>,
    pub bindings: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync: false,
            encode: true,
            collect: false,
            allowlist: None,
            bindings: BTreeMap::new(),
        }
    }
}

/// Result of expanding one template line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub output: String,
    pub collected: Option<BTreeMap<String, String>>,
}

/// Expansion state shared by the interactive loop and file mode.
pub struct Session {
    replacements: UrlReplacements<Registry>,
    pub settings: Settings,
}

impl Session {
    pub fn new() -> Self {
        Self::with_registry(variables::registry())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            replacements: UrlReplacements::new(registry),
            settings: Settings::default(),
        }
    }

    fn bindings(&self) -> Bindings {
        self.settings
            .bindings
            .iter()
            .fold(Bindings::new(), |bindings, (name, value)| {
                bindings.with_value(name.clone(), value.clone())
            })
    }

    fn params(&self, collector: Option<&CollectedVars>) -> ExpandParams {
        let mut params = ExpandParams::new().bindings(self.bindings());
        params.allowlist = self.settings.allowlist.clone();
        if let Some(collector) = collector {
            params = params.collector(collector.clone());
        }
        params
    }

    pub async fn evaluate(&self, template: &str) -> Result<Evaluation> {
        let span = tracing::debug_span!("evaluate", sync = self.settings.sync);
        self.expand(template).instrument(span).await
    }

    async fn expand(&self, template: &str) -> Result<Evaluation> {
        let collector = self.settings.collect.then(CollectedVars::new);
        let params = self.params(collector.as_ref());

        let output = match (self.settings.sync, self.settings.encode) {
            (true, true) => self.replacements.expand_url_sync(template, params)?,
            (true, false) => self.replacements.expand_string_sync(template, params),
            (false, true) => self.replacements.expand_url_async(template, params).await?,
            (false, false) => self.replacements.expand_string_async(template, params).await,
        };

        Ok(Evaluation {
            output,
            collected: collector.map(|c| c.snapshot()),
        })
    }

    /// Macros the current session would expand in `template`, `:set` names included.
    pub fn macro_names(&self, template: &str) -> Vec<String> {
        Expander::new(self.replacements.source())
            .with_bindings(self.bindings())
            .with_allowlist_set(self.settings.allowlist.clone())
            .macro_names(template)
    }

    /// Apply a settings command. Returns the message to show.
    pub fn apply(&mut self, command: &Command) -> Option<String> {
        let settings = &mut self.settings;
        let message = match command {
            Command::Set { name, value } => {
                settings.bindings.insert(name.clone(), value.clone());
                format!("Set {} = {}", name, value)
            }
            Command::Unset(name) => match settings.bindings.remove(name) {
                Some(_) => format!("Unset {}", name),
                None => format!("{} is not bound", name),
            },
            Command::Sync(on) => {
                settings.sync = *on;
                format!("Synchronous expansion {}", on_off(*on))
            }
            Command::Encode(on) => {
                settings.encode = *on;
                format!("Encoding {}", on_off(*on))
            }
            Command::Collect(on) => {
                settings.collect = *on;
                format!("Collecting {}", on_off(*on))
            }
            Command::Allow(names) => {
                settings.allowlist = names.as_ref().map(|n| n.iter().cloned().collect());
                match names {
                    Some(names) => format!("Allowing {}", names.join(", ")),
                    None => "Allowing every macro".to_string(),
                }
            }
            _ => return None,
        };
        Some(message)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

pub struct Repl {
    runtime: Runtime,
    session: Session,
    history: Vec<String>,
    line_number: usize,
}

impl Repl {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            session: Session::new(),
            history: Vec::new(),
            line_number: 1,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let _span = tracing::trace_span!("repl run").entered();
        let mut editor = Reedline::create();

        println!("URL macro REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type ':help' for commands, ':exit' to quit.");

        loop {
            let signal = editor.read_line(&self.make_prompt());

            let line = match signal {
                Ok(Signal::Success(input)) => input,
                Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => break,
                Err(e) => {
                    println!("Input error: {e}");
                    continue;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if command::is_command(trimmed) {
                match command::parse(trimmed) {
                    Ok(Command::Exit) => break,
                    Ok(cmd) => self.handle_command(cmd),
                    Err(e) => println!("\x1B[31mError: {e}\x1B[0m"),
                }
                continue;
            }

            self.history.push(line.clone());
            self.line_number += 1;
            self.evaluate_and_print(&line);
        }

        println!("Goodbye!");
        Ok(())
    }

    fn make_prompt(&self) -> DefaultPrompt {
        let mode = if self.session.settings.sync { "sync" } else { "async" };
        DefaultPrompt::new(
            DefaultPromptSegment::Basic(format!("url[{}:{}]> ", mode, self.line_number)),
            DefaultPromptSegment::Empty,
        )
    }

    fn evaluate_and_print(&self, template: &str) {
        match self.runtime.block_on(self.session.evaluate(template)) {
            Ok(evaluation) => print_evaluation(&evaluation),
            Err(e) => println!("\x1B[31m{e}\x1B[0m"),
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Help => self.show_help(),
            Command::History => self.show_history(),
            Command::Clear => print!("\x1B[2J\x1B[1;1H"),
            Command::Settings => self.show_settings(),
            Command::Names(template) => {
                let names = self.session.macro_names(&template);
                if names.is_empty() {
                    println!("(No macros found)");
                } else {
                    println!("{}", names.join(", "));
                }
            }
            other => {
                if let Some(message) = self.session.apply(&other) {
                    println!("{message}");
                }
            }
        }
    }

    fn show_help(&self) {
        println!("Available commands:");
        for (usage, description) in Command::USAGE {
            println!("  {usage:<20} - {description}");
        }
        println!("Any other line is expanded as a template.");
    }

    fn show_history(&self) {
        println!("Template history:");
        for (i, template) in self.history.iter().enumerate() {
            println!("{}: {}", i + 1, template);
        }
    }

    fn show_settings(&self) {
        let settings = &self.session.settings;
        println!("sync    = {}", on_off(settings.sync));
        println!("encode  = {}", on_off(settings.encode));
        println!("collect = {}", on_off(settings.collect));
        match &settings.allowlist {
            Some(names) => {
                let mut names: Vec<_> = names.iter().map(String::as_str).collect();
                names.sort_unstable();
                println!("allow   = {}", names.join(","));
            }
            None => println!("allow   = (all)"),
        }
        if settings.bindings.is_empty() {
            println!("(No session bindings)");
        }
        for (name, value) in &settings.bindings {
            println!("  {name} = {value}");
        }
    }
}

pub fn print_evaluation(evaluation: &Evaluation) {
    println!("=> \x1B[32m{}\x1B[0m", evaluation.output);
    if let Some(collected) = &evaluation.collected {
        for (key, value) in collected {
            println!("   \x1B[36m{key}\x1B[0m = {value:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let mut registry = Registry::new();
        registry
            .set_value("FOO", "a b")
            .set_async("LATER", |_| async { Ok("late".into()) });
        Session::with_registry(registry)
    }

    #[tokio::test]
    async fn test_evaluate_encodes_by_default() {
        let session = session();
        let evaluation = session.evaluate("x=FOO").await.unwrap();
        assert_eq!(evaluation.output, "x=a%20b");
        assert_eq!(evaluation.collected, None);
    }

    #[tokio::test]
    async fn test_session_bindings_and_sync_mode() {
        let mut session = session();
        session.apply(&Command::Set {
            name: "BAR".to_string(),
            value: "1".to_string(),
        });
        session.apply(&Command::Sync(true));
        session.apply(&Command::Collect(true));

        let evaluation = session.evaluate("BAR-LATER").await.unwrap();
        assert_eq!(evaluation.output, "1-");

        let collected = evaluation.collected.unwrap();
        assert_eq!(collected.get("BAR"), Some(&"1".to_string()));
        assert_eq!(collected.get("LATER"), Some(&String::new()));
    }

    #[tokio::test]
    async fn test_allowlist_and_names() {
        let mut session = session();
        session.apply(&Command::Allow(Some(vec!["LATER".to_string()])));
        session.apply(&Command::Encode(false));

        let evaluation = session.evaluate("FOO LATER").await.unwrap();
        assert_eq!(evaluation.output, "FOO late");
        assert_eq!(session.macro_names("FOO LATER"), vec!["LATER"]);
    }

    #[test]
    fn test_names_include_session_bindings() {
        let mut session = session();
        assert_eq!(session.macro_names("FOO BAR"), vec!["FOO"]);

        session.apply(&Command::Set {
            name: "BAR".to_string(),
            value: "1".to_string(),
        });
        assert_eq!(session.macro_names("FOO BAR"), vec!["FOO", "BAR"]);
    }

    #[test]
    fn test_non_settings_commands_are_not_applied() {
        let mut session = session();
        assert_eq!(session.apply(&Command::Help), None);
        assert_eq!(
            session.apply(&Command::Unset("NOPE".to_string())),
            Some("NOPE is not bound".to_string())
        );
    }
}
