//! Field splitting and payload spelling for string frames

use crate::error::{Error, Result};

/// Split `s` on `sep` at most `max_splits` times, never inside a quoted
/// string or a balanced `{}`/`[]` span.
pub fn split_top_level(s: &str, sep: char, max_splits: usize) -> Vec<&str>{
    let mut out = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, ch) in s.char_indices(){
        if let Some(q) = quote{
            if escaped{
                escaped = false;
            }else if ch == '\\'{
                escaped = true;
            }else if ch == q{
                quote = None;
            }
            continue;
        }

        match ch{
            '"' | '\'' => quote = Some(ch),
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 && out.len() < max_splits =>{
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    out.push(&s[start..]);
    out
}

/// Parse a device id written as decimal or `0x` hex and check it fits a byte
pub fn parse_id(field: &str, what: &str) -> Result<u8>{
    let value = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")){
        Some(hex) => i64::from_str_radix(hex, 16),
        None => field.parse::<i64>(),
    }
    .map_err(|_| Error::FrameFormat(format!("{what} must be an integer (got '{field}')")))?;

    u8::try_from(value)
        .map_err(|_| Error::FrameFormat(format!("{what} must be 0..255 (got {value})")))
}

type PayloadDecoder = fn(&str) -> Option<Vec<u8>>;

//priority order, first success wins
const PAYLOAD_DECODERS: [PayloadDecoder; 3] = [decode_json, decode_hex, decode_raw];

/// Bytes carried by a string-frame payload field
pub fn decode_payload(field: &str) -> Vec<u8>{
    PAYLOAD_DECODERS
        .iter()
        .find_map(|decode| decode(field))
        .unwrap_or_default()
}

fn decode_json(field: &str) -> Option<Vec<u8>>{
    let first = field.chars().next()?;
    if !matches!(first, '{' | '[' | '"' | '-' | '0'..='9' | 't' | 'f' | 'n'){
        return None;
    }
    serde_json::from_str::<serde_json::Value>(field).ok()?;
    Some(field.as_bytes().to_vec())
}

fn decode_hex(field: &str) -> Option<Vec<u8>>{
    if field.len() < 2 || field.len() % 2 != 0 || !field.bytes().all(|b| b.is_ascii_hexdigit()){
        return None;
    }
    hex::decode(field).ok()
}

fn decode_raw(field: &str) -> Option<Vec<u8>>{
    Some(field.as_bytes().to_vec())
}

/// Spell `payload` for a string frame: inline UTF-8 first, then hex, taking
/// the first spelling that decodes back to the same bytes.
pub fn encode_payload(payload: &[u8]) -> Option<String>{
    let inline = std::str::from_utf8(payload).ok().map(str::to_string);
    let hexed = Some(hex::encode(payload));

    [inline, hexed]
        .into_iter()
        .flatten()
        .find(|spelling| spelling.trim() == spelling.as_str() && decode_payload(spelling) == payload)
}
