//! CLI command handlers.
//!
//! This module provides testable command handlers that are invoked by main.rs.
//! Each handler implements the logic for one subcommand and returns
//! `anyhow::Result`, so library errors pick up context on the way out.

mod literal;
mod payload;
mod script;

pub use literal::{format_literal, parse_value, run_literal, LiteralForm};
pub use payload::{describe_response, format_request, render_request, run_payload, PayloadOptions};
pub use script::{EntitySpec, SaveSpec, Session, SessionScript, Step};
