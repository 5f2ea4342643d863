//! Data-carrying locking-script builders.
//!
//! Two formats:
//! 1. Simple: `OP_0 OP_RETURN <protocol tag> <content type> <payload>`
//! 2. Bitcoin Schema: B (content) + MAP (metadata) + optional AIP
//!    (authorship proof), separated by literal `|` pushes.
//!
//! Both builders are deterministic: identical inputs produce byte-identical
//! scripts, and for the schema format a byte-identical signing message. The
//! AIP signature is computed over the exact concatenation of every segment
//! emitted before the AIP segment set, in emission order, with no delimiters
//! beyond the two explicit pipe separators.

use base64::{engine::general_purpose, Engine as _};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::opcodes::{all::OP_RETURN, OP_0};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::ScriptBuf;

use crate::error::CoreError;
use crate::types::{Keypair, Payload};

/// Bitcom protocol identifier for B (content carriage).
pub const B_PROTOCOL: &str = "19HxigV4QyBv3tHpQVcUEQyq1pzZVdoAut";
/// Bitcom protocol identifier for MAP (metadata key/value indexing).
pub const MAP_PROTOCOL: &str = "1PuQa7K62MiKCtssSLKy1kh56WWU7MtUR5";
/// Bitcom protocol identifier for AIP (authorship proof).
pub const AIP_PROTOCOL: &str = "15PciHG22SNLQJXMoSUaWVi7WSqc7hCfva";

const B_ENCODING: &str = "utf-8";
const MAP_SET: &str = "SET";
const AIP_ALGORITHM: &str = "BITCOIN_ECDSA";
const SEPARATOR: &str = "|";

fn push_bytes(data: Vec<u8>) -> Result<PushBytesBuf, CoreError> {
    PushBytesBuf::try_from(data)
        .map_err(|_| CoreError::Validation("script segment exceeds maximum push size".into()))
}

/// Build a simple data script: no-value marker, data marker, then three
/// length-prefixed segments (protocol tag, content type, payload) in that
/// fixed order.
pub fn build_simple(
    protocol_tag: &str,
    content_type: &str,
    body: &[u8],
) -> Result<ScriptBuf, CoreError> {
    let script = Builder::new()
        .push_opcode(OP_0)
        .push_opcode(OP_RETURN)
        .push_slice(push_bytes(protocol_tag.as_bytes().to_vec())?)
        .push_slice(push_bytes(content_type.as_bytes().to_vec())?)
        .push_slice(push_bytes(body.to_vec())?)
        .into_script();
    Ok(script)
}

/// The segments emitted before the AIP segment set, in emission order.
/// Metadata pairs are emitted in insertion order, never re-sorted: indexing
/// consumers depend on positional order.
fn schema_segments(
    content: &str,
    content_type: &str,
    metadata: &[(String, String)],
) -> Vec<Vec<u8>> {
    let mut segments = vec![
        B_PROTOCOL.as_bytes().to_vec(),
        content.as_bytes().to_vec(),
        content_type.as_bytes().to_vec(),
        B_ENCODING.as_bytes().to_vec(),
        SEPARATOR.as_bytes().to_vec(),
        MAP_PROTOCOL.as_bytes().to_vec(),
        MAP_SET.as_bytes().to_vec(),
    ];
    for (key, value) in metadata {
        segments.push(key.as_bytes().to_vec());
        segments.push(value.as_bytes().to_vec());
    }
    segments.push(SEPARATOR.as_bytes().to_vec());
    segments
}

/// The exact byte sequence an AIP authorship signature is computed over:
/// the concatenation of every pre-AIP segment with no added delimiters.
#[must_use]
pub fn schema_signing_message(
    content: &str,
    content_type: &str,
    metadata: &[(String, String)],
) -> Vec<u8> {
    schema_segments(content, content_type, metadata).concat()
}

/// Build a Bitcoin Schema data script: B content segments, a pipe separator,
/// MAP metadata segments (insertion order), a second pipe separator, and —
/// only if a signer is supplied — an AIP segment set carrying the signer's
/// address and a base64 DER signature over the signing message.
pub fn build_schema(
    content: &str,
    content_type: &str,
    metadata: &[(String, String)],
    signer: Option<&Keypair>,
) -> Result<ScriptBuf, CoreError> {
    let segments = schema_segments(content, content_type, metadata);

    let mut builder = Builder::new().push_opcode(OP_0).push_opcode(OP_RETURN);
    for segment in &segments {
        builder = builder.push_slice(push_bytes(segment.clone())?);
    }

    if let Some(signer) = signer {
        let message = segments.concat();
        let digest = sha256::Hash::hash(&message).to_byte_array();
        let signature = signer.sign_digest(digest);
        let signature_b64 = general_purpose::STANDARD.encode(signature.serialize_der());

        builder = builder
            .push_slice(push_bytes(AIP_PROTOCOL.as_bytes().to_vec())?)
            .push_slice(push_bytes(AIP_ALGORITHM.as_bytes().to_vec())?)
            .push_slice(push_bytes(signer.address().to_string().into_bytes())?)
            .push_slice(push_bytes(signature_b64.into_bytes())?);
    }

    Ok(builder.into_script())
}

/// Build the data script for a payload, resolving the schema variant's
/// optional authorship proof against the session keypair.
pub fn build_payload_script(payload: &Payload, signer: &Keypair) -> Result<ScriptBuf, CoreError> {
    match payload {
        Payload::Simple {
            protocol_tag,
            content_type,
            body,
        } => build_simple(protocol_tag, content_type, body),
        Payload::Schema {
            content,
            content_type,
            metadata,
            signed,
        } => build_schema(
            content,
            content_type,
            metadata,
            signed.then_some(signer),
        ),
    }
}
