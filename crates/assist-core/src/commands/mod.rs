//! Slash-command grammar: tokenizer, registry with aliases and prefix
//! suggestions, and the built-in command set.

pub mod builtin;
pub mod registry;
pub mod tokenize;

pub use registry::{
    is_command, ArgSpec, ArgType, ArgValue, CommandContext, CommandDefinition, CommandRegistry,
    CommandResult, CommandSummary, ParsedCommand,
};
pub use tokenize::tokenize;
