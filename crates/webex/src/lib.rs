//! Webex Integration - conversational command engine and platform client
//!
//! This crate provides the Webex side of relay:
//! - **API client** (`api`, `credentials`) - bearer calls with one refresh-and-retry on 401, lazy pagination
//! - **Directory** (`people`, `authz`) - person lookups and the fail-closed authorization gate
//! - **Commands** (`commands`, `conversation`) - keyword/callback registry and per-sender chains
//! - **Dispatch** (`events`, `runner`) - routing of hydrated events, ordered per sender
//! - **Output** (`responder`, `messages`, `cards`, `fanout`) - replies, adaptive cards, bulk delivery
//! - **Provisioning** (`rooms`, `devices`) - group rooms, memberships and phone registration
//! - **Ingress** (`webhooks`) - notification hydration and webhook registration
//!
//! # Architecture
//!
//! ```text
//! Webhook → EventRunner (per sender) → EventHydrator → Dispatcher → CommandHandler
//!                                            ↓               ↓
//!                                   ConversationStore   Responder / fan_out
//! ```

pub mod api;
pub mod authz;
pub mod cards;
pub mod commands;
pub mod conversation;
pub mod credentials;
pub mod devices;
pub mod events;
pub mod fanout;
pub mod messages;
pub mod people;
pub mod responder;
pub mod rooms;
pub mod runner;
pub mod webhooks;

pub use api::{ApiClient, ApiError, ApiRequest, HttpTransport, Page, ReqwestTransport};
pub use authz::AuthorizationGate;
pub use commands::{Command, CommandHandler, CommandRegistry, CommandReply, Invocation};
pub use conversation::ConversationStore;
pub use events::{DispatchOutcome, Dispatcher, IncomingEvent};
pub use responder::{ReplyContent, Responder};
pub use runner::EventRunner;
