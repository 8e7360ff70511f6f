//! Codex CLI invocation: `codex <subcommand> [prompt] [args...]`.

use serde::{Deserialize, Serialize};

/// Codex subcommands exposed to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subcommand {
    #[default]
    Exec,
    Apply,
    Resume,
    Sandbox,
}

impl Subcommand {
    pub const ALL: [Subcommand; 4] = [
        Subcommand::Exec,
        Subcommand::Apply,
        Subcommand::Resume,
        Subcommand::Sandbox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subcommand::Exec => "exec",
            Subcommand::Apply => "apply",
            Subcommand::Resume => "resume",
            Subcommand::Sandbox => "sandbox",
        }
    }
}

impl std::fmt::Display for Subcommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One Codex invocation, independent of which binary runs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexCommand {
    #[serde(default)]
    pub subcommand: Subcommand,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CodexCommand {
    pub fn new(subcommand: Subcommand) -> Self {
        Self {
            subcommand,
            prompt: None,
            args: Vec::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments after the program name. An empty prompt is omitted.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.subcommand.as_str().to_string());
        if let Some(prompt) = self.prompt.as_deref().filter(|p| !p.is_empty()) {
            argv.push(prompt.to_string());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Bind this command to the CLI binary that runs it.
    pub fn invocation(&self, program: impl Into<String>) -> Invocation {
        Invocation::new(program, self.argv())
    }
}

/// A concrete program + argv pair handed to the process runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Shell-like rendering for status reports. Not meant to be re-parsed.
    pub fn display(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| quote(arg)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:,".contains(c))
    {
        arg.to_string()
    } else {
        format!("{:?}", arg)
    }
}
