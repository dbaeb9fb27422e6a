//! Pipeline stages, one module per gateway or Edelia operation group.

pub mod auth;
pub mod bills;
pub mod consumption;
pub mod contracts;
pub mod edelia;
pub mod partner;
pub mod payment;

use crate::doc::{self, Node};
use crate::errors::ConnectorError;
use crate::models::{Client, Entries};
use crate::pipeline::Scratch;

/// Owned copy of a text leaf at `path`.
fn text(node: &Node, path: &[&str]) -> Option<String> {
    doc::extract_text(node, path).map(str::to_string)
}

/// Session token established by the authentication stage.
fn session_token(scratch: &Scratch) -> Result<String, ConnectorError> {
    scratch
        .edf_token
        .clone()
        .ok_or_else(|| ConnectorError::Parse("No session token in pipeline state".to_string()))
}

/// The account holder created by the contract-listing stage.
fn current_client(entries: &Entries) -> Result<&Client, ConnectorError> {
    entries
        .clients
        .first()
        .ok_or_else(|| ConnectorError::Parse("No client in pipeline state".to_string()))
}
