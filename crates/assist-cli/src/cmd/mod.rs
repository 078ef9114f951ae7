pub mod commands;
pub mod modes;
pub mod parse;
pub mod repl;
