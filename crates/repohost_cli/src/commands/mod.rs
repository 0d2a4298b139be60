//! CLI commands.

pub mod create;
pub mod delete;
pub mod gc;
pub mod list;
pub mod mirror;
pub mod network;
pub mod permissions;
pub mod rename;
pub mod serve;
pub mod show;
