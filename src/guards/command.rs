//! Command Authorization
//!
//! Turns a raw, caller-supplied command line into a [`CommandLine`] that is
//! safe to execute as an argument vector. Both the program name and every
//! argument token must appear in the [`AllowedCommandTable`]; nothing is ever
//! handed to a shell.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ErrorKind;

/// Characters whose meaning depends on a shell.
///
/// No shell is ever invoked, so a command line containing one of these is
/// ambiguous about what the caller intended and is rejected outright:
/// - ; : Command separator
/// - | : Pipe
/// - & : Background execution
/// - $ : Variable expansion
/// - ` : Command substitution
/// - ( ) : Subshell
/// - < > : Redirection
/// - # : Comment (would silently drop the rest of the line)
/// - \n \r \0 : Line and string terminators
const SHELL_METACHARACTERS: [char; 13] = [
    ';', '|', '&', '$', '`', '(', ')', '<', '>', '#', '\n', '\r', '\0',
];

/// Errors produced while authorizing a command line
///
/// Variants that point at input carry only the isolated offending token,
/// never the raw command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("command line could not be tokenized")]
    Unparseable,

    #[error("command line contains a shell control character")]
    ShellMetacharacter { character: char },

    #[error("command is not in the allowed whitelist")]
    CommandNotAllowed { command: String },

    #[error("argument is not allowed for this command")]
    ArgumentNotAllowed { token: String },
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::EmptyCommand
            | CommandError::Unparseable
            | CommandError::ShellMetacharacter { .. } => ErrorKind::Validation,
            CommandError::CommandNotAllowed { .. } | CommandError::ArgumentNotAllowed { .. } => {
                ErrorKind::Authz
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CommandError::EmptyCommand => "empty_command",
            CommandError::Unparseable => "unparseable_command",
            CommandError::ShellMetacharacter { .. } => "shell_metacharacter",
            CommandError::CommandNotAllowed { .. } => "command_not_allowed",
            CommandError::ArgumentNotAllowed { .. } => "argument_not_allowed",
        }
    }

    /// The offending token, when there is one
    pub fn token(&self) -> Option<&str> {
        match self {
            CommandError::CommandNotAllowed { command } => Some(command),
            CommandError::ArgumentNotAllowed { token } => Some(token),
            _ => None,
        }
    }
}

/// Errors in the static command policy (raised at startup, never per request)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("allowed command has an empty name")]
    EmptyName,

    #[error("allowed command name '{0}' must be a bare program name")]
    InvalidName(String),

    #[error("allowed command '{0}' is listed more than once")]
    Duplicate(String),

    #[error("unknown argument policy '{0}' (expected \"any\" or a list of tokens)")]
    UnknownArgPolicy(String),
}

/// Arguments a whitelisted command may receive
///
/// An empty `Only` set means the command takes no arguments at all, which is
/// not the same as `Any`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAllowedArgs", into = "RawAllowedArgs")]
pub enum AllowedArgs {
    Any,
    Only(BTreeSet<String>),
}

impl AllowedArgs {
    pub fn none() -> Self {
        AllowedArgs::Only(BTreeSet::new())
    }

    pub fn only<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowedArgs::Only(tokens.into_iter().map(Into::into).collect())
    }

    pub fn permits(&self, token: &str) -> bool {
        match self {
            AllowedArgs::Any => true,
            AllowedArgs::Only(set) => set.contains(token),
        }
    }
}

impl Default for AllowedArgs {
    fn default() -> Self {
        Self::none()
    }
}

/// TOML shape: `args = "any"` or `args = ["hello", "world"]`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawAllowedArgs {
    Keyword(String),
    List(BTreeSet<String>),
}

impl TryFrom<RawAllowedArgs> for AllowedArgs {
    type Error = TableError;

    fn try_from(raw: RawAllowedArgs) -> Result<Self, Self::Error> {
        match raw {
            RawAllowedArgs::Keyword(k) if k.eq_ignore_ascii_case("any") => Ok(AllowedArgs::Any),
            RawAllowedArgs::Keyword(k) => Err(TableError::UnknownArgPolicy(k)),
            RawAllowedArgs::List(set) => Ok(AllowedArgs::Only(set)),
        }
    }
}

impl From<AllowedArgs> for RawAllowedArgs {
    fn from(args: AllowedArgs) -> Self {
        match args {
            AllowedArgs::Any => RawAllowedArgs::Keyword("any".to_string()),
            AllowedArgs::Only(set) => RawAllowedArgs::List(set),
        }
    }
}

/// One entry of the command whitelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedCommandSpec {
    /// Program name, matched exactly against the first token
    pub name: String,

    /// Permitted argument tokens
    #[serde(default)]
    pub args: AllowedArgs,
}

impl AllowedCommandSpec {
    pub fn new(name: impl Into<String>, args: AllowedArgs) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Immutable whitelist of programs and their argument vocabulary
///
/// Built once at startup and shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCommandTable {
    commands: BTreeMap<String, AllowedArgs>,
}

impl AllowedCommandTable {
    /// Build a table, rejecting empty, path-like, or duplicate names
    pub fn new<I>(specs: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = AllowedCommandSpec>,
    {
        let mut commands = BTreeMap::new();
        for spec in specs {
            if spec.name.is_empty() {
                return Err(TableError::EmptyName);
            }
            let bad_char = |c: char| {
                c.is_whitespace() || c == '/' || c == '\\' || SHELL_METACHARACTERS.contains(&c)
            };
            if spec.name.chars().any(bad_char) || spec.name.contains("..") {
                return Err(TableError::InvalidName(spec.name));
            }
            if commands.contains_key(&spec.name) {
                return Err(TableError::Duplicate(spec.name));
            }
            commands.insert(spec.name, spec.args);
        }
        Ok(Self { commands })
    }

    /// The whitelist used when configuration does not provide one
    pub fn default_specs() -> Vec<AllowedCommandSpec> {
        vec![
            AllowedCommandSpec::new("echo", AllowedArgs::only(["hello", "world"])),
            AllowedCommandSpec::new("date", AllowedArgs::none()),
            AllowedCommandSpec::new("uptime", AllowedArgs::none()),
            AllowedCommandSpec::new("whoami", AllowedArgs::none()),
            AllowedCommandSpec::new("ls", AllowedArgs::only(["-l", "-a", "-la"])),
        ]
    }

    pub fn with_default_whitelist() -> Self {
        let mut commands = BTreeMap::new();
        for spec in Self::default_specs() {
            commands.insert(spec.name, spec.args);
        }
        Self { commands }
    }

    pub fn get(&self, name: &str) -> Option<&AllowedArgs> {
        self.commands.get(name)
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for AllowedCommandTable {
    fn default() -> Self {
        Self::with_default_whitelist()
    }
}

/// A tokenized command line whose program and arguments are all whitelisted
///
/// Only [`CommandAuthorizer`] constructs one.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandLine").field(&self.tokens).finish()
    }
}

/// Tokens from a command line that passed the syntax checks but has not
/// been matched against the whitelist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens(Vec<String>);

impl Tokens {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Approves or rejects raw command lines against an [`AllowedCommandTable`]
///
/// # Security Principles
///
/// 1. **Whitelist Only**: unknown programs and unknown arguments are rejected
/// 2. **Fail Closed**: any quoting ambiguity or shell syntax rejects the whole line
/// 3. **No Echo**: errors name the offending token, never the raw input
#[derive(Debug, Clone)]
pub struct CommandAuthorizer {
    table: Arc<AllowedCommandTable>,
}

impl CommandAuthorizer {
    pub fn new(table: Arc<AllowedCommandTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &AllowedCommandTable {
        &self.table
    }

    /// Tokenize and authorize a raw command line
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use warden::guards::{AllowedCommandTable, CommandAuthorizer};
    ///
    /// let authorizer = CommandAuthorizer::new(Arc::new(AllowedCommandTable::default()));
    /// let line = authorizer.authorize("echo hello").unwrap();
    /// assert_eq!(line.tokens(), ["echo", "hello"]);
    /// assert!(authorizer.authorize("echo rm -rf /").is_err());
    /// ```
    pub fn authorize(&self, raw: &str) -> Result<CommandLine, CommandError> {
        let tokens = Self::tokenize(raw)?;
        self.authorize_tokens(tokens)
    }

    /// Split a raw command line with shell-word semantics
    ///
    /// This does not consult the whitelist, so callers can reject malformed
    /// input before doing any authentication work.
    pub fn tokenize(raw: &str) -> Result<Tokens, CommandError> {
        if raw.trim().is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        if let Some(character) = raw.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(CommandError::ShellMetacharacter { character });
        }

        let tokens = shell_words::split(raw).map_err(|_| CommandError::Unparseable)?;
        if tokens.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        Ok(Tokens(tokens))
    }

    /// Match already-tokenized input against the whitelist
    pub fn authorize_tokens(&self, tokens: Tokens) -> Result<CommandLine, CommandError> {
        let tokens = tokens.0;
        let program = &tokens[0];

        let allowed = self
            .table
            .get(program)
            .ok_or_else(|| CommandError::CommandNotAllowed {
                command: program.clone(),
            })?;

        if let Some(token) = tokens[1..].iter().find(|t| !allowed.permits(t)) {
            return Err(CommandError::ArgumentNotAllowed {
                token: token.clone(),
            });
        }

        Ok(CommandLine { tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn authorizer() -> CommandAuthorizer {
        CommandAuthorizer::new(Arc::new(AllowedCommandTable::default()))
    }

    #[test]
    fn test_default_whitelist() {
        let table = AllowedCommandTable::default();

        assert!(table.is_allowed("echo"));
        assert!(table.is_allowed("date"));
        assert!(table.is_allowed("ls"));

        assert!(!table.is_allowed("bash"));
        assert!(!table.is_allowed("sh"));
        assert!(!table.is_allowed("rm"));
        assert!(!table.is_allowed("/bin/echo"));
    }

    #[test]
    fn test_echo_hello_is_approved() {
        let line = authorizer().authorize("echo hello").unwrap();
        assert_eq!(line.tokens(), ["echo", "hello"]);
        assert_eq!(line.program(), "echo");
        assert_eq!(line.args(), ["hello"]);
    }

    #[test]
    fn test_rejects_on_first_unlisted_argument() {
        let err = authorizer().authorize("echo rm -rf /").unwrap_err();
        assert_eq!(
            err,
            CommandError::ArgumentNotAllowed {
                token: "rm".to_string()
            }
        );
        assert_eq!(err.kind(), ErrorKind::Authz);
    }

    #[test]
    fn test_unknown_program() {
        let err = authorizer().authorize("bash -c id").unwrap_err();
        assert_eq!(
            err,
            CommandError::CommandNotAllowed {
                command: "bash".to_string()
            }
        );
        assert_eq!(err.token(), Some("bash"));
    }

    #[test]
    fn test_program_with_path_is_not_the_program() {
        let err = authorizer().authorize("/bin/echo hello").unwrap_err();
        assert!(matches!(err, CommandError::CommandNotAllowed { .. }));
    }

    #[test]
    fn test_empty_command() {
        assert_eq!(authorizer().authorize(""), Err(CommandError::EmptyCommand));
        assert_eq!(authorizer().authorize("   \t"), Err(CommandError::EmptyCommand));
    }

    #[test]
    fn test_unterminated_quote_fails_closed() {
        assert_eq!(
            authorizer().authorize("echo 'hello"),
            Err(CommandError::Unparseable)
        );
        assert_eq!(
            authorizer().authorize("echo \"hello"),
            Err(CommandError::Unparseable)
        );
    }

    #[test]
    fn test_quoting_is_respected() {
        let table = AllowedCommandTable::new([AllowedCommandSpec::new(
            "echo",
            AllowedArgs::only(["hello world"]),
        )])
        .unwrap();
        let authorizer = CommandAuthorizer::new(Arc::new(table));

        let line = authorizer.authorize("echo 'hello world'").unwrap();
        assert_eq!(line.tokens(), ["echo", "hello world"]);

        // Unquoted, the same words are two tokens and neither is listed
        assert!(authorizer.authorize("echo hello world").is_err());
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        let dangerous = vec![
            ("date ; ls", ';'),
            ("echo hello | cat", '|'),
            ("echo hello & id", '&'),
            ("echo $HOME", '$'),
            ("echo `whoami`", '`'),
            ("echo hello\nid", '\n'),
            ("echo hello\rid", '\r'),
            ("echo (id)", '('),
            ("echo hello > out", '>'),
            ("echo < in", '<'),
            ("echo hello #tail", '#'),
            ("echo 'quoted;still'", ';'),
        ];

        for (raw, character) in dangerous {
            let err = authorizer().authorize(raw).unwrap_err();
            assert_eq!(
                err,
                CommandError::ShellMetacharacter { character },
                "should reject {:?}",
                raw
            );
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_no_argument_command_rejects_any_argument() {
        assert!(authorizer().authorize("date").is_ok());
        let err = authorizer().authorize("date -s 2020-01-01").unwrap_err();
        assert_eq!(
            err,
            CommandError::ArgumentNotAllowed {
                token: "-s".to_string()
            }
        );
    }

    #[test]
    fn test_any_arguments() {
        let spec = AllowedCommandSpec::new("printf", AllowedArgs::Any);
        let table = AllowedCommandTable::new([spec]).unwrap();
        let authorizer = CommandAuthorizer::new(Arc::new(table));
        let line = authorizer.authorize("printf %s anything goes").unwrap();
        assert_eq!(line.args().len(), 3);
    }

    #[test]
    fn test_error_messages_do_not_echo_input() {
        let err = authorizer().authorize("definitely-not-allowed").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("not in the allowed whitelist"));
        assert!(!msg.contains("definitely-not-allowed"));
    }

    #[test]
    fn test_table_rejects_bad_names() {
        assert_eq!(
            AllowedCommandTable::new([AllowedCommandSpec::new("", AllowedArgs::Any)]),
            Err(TableError::EmptyName)
        );
        assert!(matches!(
            AllowedCommandTable::new([AllowedCommandSpec::new("/bin/sh", AllowedArgs::Any)]),
            Err(TableError::InvalidName(_))
        ));
        assert!(matches!(
            AllowedCommandTable::new([AllowedCommandSpec::new("my tool", AllowedArgs::Any)]),
            Err(TableError::InvalidName(_))
        ));
        assert!(matches!(
            AllowedCommandTable::new([
                AllowedCommandSpec::new("echo", AllowedArgs::Any),
                AllowedCommandSpec::new("echo", AllowedArgs::none()),
            ]),
            Err(TableError::Duplicate(_))
        ));
    }

    #[test]
    fn test_allowed_args_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            commands: Vec<AllowedCommandSpec>,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [[commands]]
            name = "echo"
            args = ["hello"]

            [[commands]]
            name = "env"
            args = "any"

            [[commands]]
            name = "date"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.commands[0].args, AllowedArgs::only(["hello"]));
        assert_eq!(parsed.commands[1].args, AllowedArgs::Any);
        assert_eq!(parsed.commands[2].args, AllowedArgs::none());

        let bad: Result<Wrapper, _> = toml::from_str(
            r#"
            [[commands]]
            name = "echo"
            args = "everything"
            "#,
        );
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_unlisted_program_rejected(program in "[a-z][a-z0-9_-]{0,15}") {
            let authorizer = authorizer();
            prop_assume!(!authorizer.table().is_allowed(&program));
            let raw = format!("{} hello", program);
            let result = authorizer.authorize(&raw);
            let is_not_allowed = matches!(result, Err(CommandError::CommandNotAllowed { .. }));
            prop_assert!(is_not_allowed);
        }

        #[test]
        fn prop_listed_tokens_approved(
            args in prop::collection::vec(prop_oneof![Just("hello"), Just("world")], 0..6),
        ) {
            let raw = std::iter::once("echo")
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            let line = authorizer().authorize(&raw).unwrap();
            prop_assert_eq!(line.args().len(), args.len());
        }
    }
}
