//! Inscription decoding
//!
//! An inscription rides in the scriptSig of a transaction's first input as an `ord` envelope:
//!
//! ```text
//! <"ord"> <piece count> <content type> (<countdown> <chunk>)* ...
//! ```
//!
//! The chunks are concatenated and parsed as a JSON object carrying at least `p` (protocol tag)
//! and `op`. Decoding never touches the database.

use crate::chain::RawTransaction;
use crate::error::{IndexerError, IndexerResult};
use serde_json::Value;

const ENVELOPE_MARKER: &[u8] = b"ord";
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1NEGATE: u8 = 0x4f;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;

#[derive(Debug, Clone, PartialEq)]
pub struct Inscription {
    pub protocol: String,
    pub op: String,
    pub content_type: String,
    pub body: Value,
}

pub trait Decoder: Send + Sync {
    fn decode(&self, tx: &RawTransaction) -> IndexerResult<Inscription>;
}

/// Reads the envelope from the first input's scriptSig
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptSigDecoder;

impl Decoder for ScriptSigDecoder {
    fn decode(&self, tx: &RawTransaction) -> IndexerResult<Inscription> {
        let hex_script = tx
            .vin
            .first()
            .and_then(|input| input.script_sig.as_ref())
            .map(|sig| sig.hex.as_str())
            .ok_or_else(|| IndexerError::Decode("no scriptSig on first input".to_string()))?;

        let script = hex::decode(hex_script)
            .map_err(|e| IndexerError::Decode(format!("scriptSig is not hex: {}", e)))?;
        decode_envelope(&script)
    }
}

/// Split a script into its pushed byte strings; small-integer opcodes become one-byte pushes
pub fn parse_pushes(script: &[u8]) -> IndexerResult<Vec<Vec<u8>>> {
    let mut pushes = Vec::new();
    let mut i = 0usize;

    while i < script.len() {
        let opcode = script[i];
        i += 1;

        let len = match opcode {
            0x00 => 0,
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => {
                let n = read_le(script, i, 1)?;
                i += 1;
                n
            }
            OP_PUSHDATA2 => {
                let n = read_le(script, i, 2)?;
                i += 2;
                n
            }
            OP_PUSHDATA4 => {
                let n = read_le(script, i, 4)?;
                i += 4;
                n
            }
            OP_1NEGATE => {
                pushes.push(vec![0x81]);
                continue;
            }
            OP_1..=OP_16 => {
                pushes.push(vec![opcode - OP_1 + 1]);
                continue;
            }
            other => {
                return Err(IndexerError::Decode(format!(
                    "unexpected opcode 0x{:02x} in envelope",
                    other
                )))
            }
        };

        let end = i
            .checked_add(len)
            .filter(|end| *end <= script.len())
            .ok_or_else(|| IndexerError::Decode("push runs past end of script".to_string()))?;
        pushes.push(script[i..end].to_vec());
        i = end;
    }

    Ok(pushes)
}

fn read_le(script: &[u8], at: usize, width: usize) -> IndexerResult<usize> {
    let bytes = script
        .get(at..at + width)
        .ok_or_else(|| IndexerError::Decode("truncated pushdata length".to_string()))?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

/// Minimal little-endian script number
fn script_number(bytes: &[u8]) -> IndexerResult<u64> {
    if bytes.len() > 4 {
        return Err(IndexerError::Decode("piece count too large".to_string()));
    }
    Ok(bytes
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

pub fn decode_envelope(script: &[u8]) -> IndexerResult<Inscription> {
    let pushes = parse_pushes(script)?;
    let mut it = pushes.into_iter();

    if it.next().as_deref() != Some(ENVELOPE_MARKER) {
        return Err(IndexerError::Decode("missing ord envelope".to_string()));
    }
    let pieces = script_number(
        &it.next()
            .ok_or_else(|| IndexerError::Decode("missing piece count".to_string()))?,
    )?;
    let content_type = it
        .next()
        .ok_or_else(|| IndexerError::Decode("missing content type".to_string()))?;
    let content_type = String::from_utf8(content_type)
        .map_err(|_| IndexerError::Decode("content type is not utf-8".to_string()))?;

    let mut data = Vec::new();
    for expected in (0..pieces).rev() {
        let countdown = it
            .next()
            .ok_or_else(|| IndexerError::Decode("envelope ends early".to_string()))?;
        if script_number(&countdown)? != expected {
            return Err(IndexerError::Decode("piece countdown out of order".to_string()));
        }
        let chunk = it
            .next()
            .ok_or_else(|| IndexerError::Decode("envelope ends early".to_string()))?;
        data.extend_from_slice(&chunk);
    }

    let body: Value = serde_json::from_slice(&data)
        .map_err(|e| IndexerError::Decode(format!("payload is not json: {}", e)))?;
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| IndexerError::Decode(format!("payload missing {:?}", name)))
    };
    let protocol = field("p")?;
    let op = field("op")?;

    Ok(Inscription {
        protocol,
        op,
        content_type,
        body,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::envelope_script;
    use super::*;

    #[test]
    fn test_decode_single_piece() {
        let script = envelope_script(r#"{"p":"drc-20","op":"mint","tick":"DOGI","amt":"500"}"#);
        let inscription = decode_envelope(&script).unwrap();
        assert_eq!(inscription.protocol, "drc-20");
        assert_eq!(inscription.op, "mint");
        assert_eq!(inscription.body["amt"], "500");
    }

    #[test]
    fn test_decode_multi_piece() {
        let name = "x".repeat(400);
        let payload = format!(r#"{{"p":"meme-20","op":"deploy","tick":"M","name":"{}","max":"1"}}"#, name);
        let inscription = decode_envelope(&envelope_script(&payload)).unwrap();
        assert_eq!(inscription.body["name"].as_str().unwrap().len(), 400);
    }

    #[test]
    fn test_rejects_non_envelope() {
        assert!(decode_envelope(&[0x03, b'f', b'o', b'o']).is_err());
        assert!(decode_envelope(&[0x4c]).is_err());
        assert!(decode_envelope(&[0xac]).is_err());
    }

    #[test]
    fn test_rejects_missing_protocol() {
        let script = envelope_script(r#"{"op":"mint"}"#);
        assert!(matches!(
            decode_envelope(&script),
            Err(IndexerError::Decode(_))
        ));
    }
}
