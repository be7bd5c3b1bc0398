//! Payload command handler.
//!
//! Replays a session script, prints the request it would send and, when a
//! recorded response is supplied, applies it and reports the outcome.

use super::script::{Session, SessionScript};
use crate::client::PreparedRequest;
use crate::config::ClientConfig;
use crate::graph::SaveMode;
use crate::model::EntityState;
use crate::response::{OperationResponse, SaveChangesResponse, SaveResult};
use crate::transport::ODataResponse;
use anyhow::{anyhow, Context, Result};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Options of the `payload` subcommand.
#[derive(Debug, Clone)]
pub struct PayloadOptions {
    pub script: PathBuf,
    pub config: ClientConfig,
    /// Overrides the script's save mode
    pub mode: Option<SaveMode>,
    /// Print the request line and headers before the body
    pub headers: bool,
    /// Recorded response body to correlate
    pub response: Option<PathBuf>,
    pub status: u16,
    pub output: Option<PathBuf>,
}

/// Replay `script` and build the request named by its `save` section.
pub fn render_request(
    script: &SessionScript,
    config: ClientConfig,
    mode: Option<SaveMode>,
) -> Result<(Session, PreparedRequest)> {
    let save = script
        .save
        .as_ref()
        .ok_or_else(|| anyhow!("the script has no 'save' section"))?;
    let session = script.replay(config)?;
    let roots = session.roots(save)?;
    let mode = mode.unwrap_or(save.mode);
    let prepared = session
        .context
        .build_request(mode, &roots)
        .with_context(|| format!("building the {mode} request"))?;
    Ok((session, prepared))
}

/// Request line, headers and body as text.
#[must_use]
pub fn format_request(prepared: &PreparedRequest, headers: bool) -> String {
    let request = &prepared.request;
    let mut out = String::new();
    if headers {
        let _ = writeln!(out, "{} {}", request.method, request.uri);
        for (name, value) in &request.headers {
            let _ = writeln!(out, "{name}: {value}");
        }
        out.push('\n');
    }
    out.push_str(&request.body_text());
    out.push('\n');
    out
}

/// One line per operation, indented like the request tree.
#[must_use]
pub fn describe_response(response: &SaveChangesResponse) -> String {
    fn walk(out: &mut String, op: &OperationResponse, depth: usize) {
        let outcome = op
            .error
            .as_ref()
            .map_or_else(|| "ok".to_string(), |err| format!("failed: {}", err.message));
        let _ = writeln!(out, "{:indent$}{} {} {outcome}", "", op.descriptor, op.status_code, indent = depth * 2);
        for nested in &op.nested {
            walk(out, nested, depth + 1);
        }
    }

    let mut out = format!("state: {}\n", response.state);
    for op in &response.operations {
        walk(&mut out, op, 0);
    }
    out
}

fn describe_session(session: &Session) -> String {
    let mut out = String::new();
    for (name, &instance) in &session.names {
        let state = session
            .context
            .get_descriptor(instance)
            .map_or_else(|| EntityState::Detached.to_string(), |d| d.state().to_string());
        let _ = writeln!(out, "{name}: {state}");
    }
    out
}

/// Run the payload command.
pub fn run_payload(options: PayloadOptions) -> Result<()> {
    let script = SessionScript::load(&options.script)?;
    let (mut session, prepared) = render_request(&script, options.config, options.mode)?;
    let mut out = format_request(&prepared, options.headers);

    if let Some(path) = &options.response {
        let body = std::fs::read(path)
            .with_context(|| format!("failed to read response {}", path.display()))?;
        let response = ODataResponse::new(options.status, body);
        let mut result = SaveResult::new();
        result.begin_sending();
        let outcome = session
            .context
            .apply_response(&prepared.shape, &response, &mut result);
        out.push('\n');
        match &outcome {
            Ok(saved) => out.push_str(&describe_response(saved)),
            Err(err) => {
                if let Some(request) = err.as_request_error() {
                    out.push_str(&describe_response(&request.response));
                }
                let _ = writeln!(out, "error: {err}");
            }
        }
        out.push_str(&describe_session(&session));
    }

    match &options.output {
        Some(path) => {
            std::fs::write(path, &out).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("wrote payload to {}", path.display());
        }
        None => print!("{out}"),
    }
    Ok(())
}
