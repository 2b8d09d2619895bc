//! stackcord core library: command routing, processor chain, per-room action scheduling and
//! the Discord → Stack chat relay, plus the gateway and collaborators used by the CLI.

pub mod actions;
pub mod bridge;
pub mod channels;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod filehost;
pub mod gateway;
pub mod init;
pub mod processors;
pub mod relay;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod session;
