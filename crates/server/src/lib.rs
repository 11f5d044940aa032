//! HTTP surface and wiring for the relay bot.
//!
//! `bootstrap` assembles the engine from configuration, `ingress` receives
//! platform webhooks and serves `/health`, and `commands` holds what the bot
//! actually answers to.

pub mod bootstrap;
pub mod commands;
pub mod ingress;
