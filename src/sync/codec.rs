//! Canonical encoding of an ordered action list for the remote file.

use crate::core::{Action, LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const CLOUD_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudEncoding {
    #[default]
    Json,
    MessagePack,
}

#[derive(Debug, Serialize, Deserialize)]
struct CloudEnvelope {
    format_version: u16,
    actions: Vec<Action>,
}

/// Encodes `actions` in the given order, renumbering sequences from 1.
pub fn encode_actions(actions: &[Action], encoding: CloudEncoding) -> Result<Vec<u8>> {
    let envelope = CloudEnvelope {
        format_version: CLOUD_FORMAT_VERSION,
        actions: actions
            .iter()
            .enumerate()
            .map(|(index, action)| action.clone().at_sequence(index as u64 + 1))
            .collect(),
    };

    match encoding {
        CloudEncoding::Json => serde_json::to_vec(&envelope)
            .map_err(|err| LedgerError::InvalidArgument(format!("encode json: {}", err))),
        CloudEncoding::MessagePack => rmp_serde::to_vec_named(&envelope)
            .map_err(|err| LedgerError::InvalidArgument(format!("encode msgpack: {}", err))),
    }
}

/// Which encoding `bytes` were written with. JSON envelopes start with `{`.
pub fn detect_encoding(bytes: &[u8]) -> CloudEncoding {
    match bytes.iter().find(|byte| !byte.is_ascii_whitespace()) {
        Some(b'{') => CloudEncoding::Json,
        _ => CloudEncoding::MessagePack,
    }
}

/// Decodes a remote file. Empty content is an empty log.
pub fn decode_actions(bytes: &[u8]) -> Result<Vec<Action>> {
    if bytes.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let envelope: CloudEnvelope = match detect_encoding(bytes) {
        CloudEncoding::Json => serde_json::from_slice(bytes)
            .map_err(|err| LedgerError::DecodeFailure(format!("json envelope: {}", err)))?,
        CloudEncoding::MessagePack => rmp_serde::from_slice(bytes)
            .map_err(|err| LedgerError::DecodeFailure(format!("msgpack envelope: {}", err)))?,
    };

    if envelope.format_version != CLOUD_FORMAT_VERSION {
        return Err(LedgerError::DecodeFailure(format!(
            "unsupported remote format version {}",
            envelope.format_version
        )));
    }

    let mut ids = HashSet::with_capacity(envelope.actions.len());
    for (index, action) in envelope.actions.iter().enumerate() {
        let expected = index as u64 + 1;
        if action.sequence != expected {
            return Err(LedgerError::DecodeFailure(format!(
                "action {} has sequence {}, expected {}",
                action.id, action.sequence, expected
            )));
        }
        if !ids.insert(action.id) {
            return Err(LedgerError::DecodeFailure(format!(
                "action {} appears twice",
                action.id
            )));
        }
    }
    Ok(envelope.actions)
}
