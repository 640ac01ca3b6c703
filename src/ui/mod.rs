pub mod commands;
pub mod terminal;
