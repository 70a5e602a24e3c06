//! Dual-format application frames (binary or human-readable string)
//!
//! Binary frame (big-endian):
//!
//! ```text
//! 'B' 'R' | version | cmd | src | dst | len:u16 | payload[len] | checksum:u16
//! ```
//!
//! The checksum is the 16-bit truncated sum of every byte before it.
//!
//! String frame:
//!
//! ```text
//! <src,dst,COMMAND[,payload]>
//! ```
//!
//! No I/O happens here; the codec only turns frames into bytes and back.

pub mod text;

use crate::error::{Error, Result};

pub const MAGIC: [u8; 2] = *b"BR";
/// magic(2) + version + cmd + src + dst + len(2)
pub const HEADER_LEN: usize = 8;
pub const CHECKSUM_LEN: usize = 2;
pub const MIN_BINARY_LEN: usize = HEADER_LEN + CHECKSUM_LEN;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command{
    Reset = 0x01,
    EnterProgrammingMode = 0x02,
    Post = 0x10,
}

impl Command{
    pub const ALL: [Command; 3] = [Command::Reset, Command::EnterProgrammingMode, Command::Post];

    pub fn from_u8(val: u8) -> Option<Self>{
        Self::ALL.into_iter().find(|cmd| *cmd as u8 == val)
    }

    /// Name used on the wire by string frames
    pub fn name(&self) -> &'static str{
        match self{
            Command::Reset => "RST",
            Command::EnterProgrammingMode => "PROG",
            Command::Post => "POST",
        }
    }

    pub fn from_name(name: &str) -> Option<Self>{
        Self::ALL.into_iter().find(|cmd| cmd.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding{
    Binary,
    String,
}

/// A decoded frame.
///
/// `version` and `checksum_valid` are only carried by binary frames. A binary
/// frame whose checksum disagrees is still returned, flagged with
/// `checksum_valid == Some(false)`; use [`FrameCodec::parse_verified`] to turn
/// that into an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame{
    pub encoding: Encoding,
    pub version: Option<u8>,
    pub command: Command,
    pub source: u8,
    pub destination: u8,
    pub payload: Vec<u8>,
    pub checksum_valid: Option<bool>,
}

impl Frame{
    /// Payload as UTF-8 text, if it is valid UTF-8
    pub fn payload_text(&self) -> Option<&str>{
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload as a JSON value, if it is UTF-8 JSON
    pub fn payload_json(&self) -> Option<serde_json::Value>{
        serde_json::from_str(self.payload_text()?).ok()
    }
}

/// Outbound payload before normalization to bytes
#[derive(Debug, Clone, PartialEq)]
pub enum Payload{
    Bytes(Vec<u8>),
    Text(String),
    /// Serialized as compact JSON text
    Json(serde_json::Value),
}

impl Payload{
    pub fn into_bytes(self) -> Result<Vec<u8>>{
        match self{
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Text(text) => Ok(text.into_bytes()),
            Payload::Json(value) => Ok(serde_json::to_vec(&value)?),
        }
    }
}

impl From<Vec<u8>> for Payload{
    fn from(bytes: Vec<u8>) -> Self{
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload{
    fn from(bytes: &[u8]) -> Self{
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload{
    fn from(text: String) -> Self{
        Payload::Text(text)
    }
}

impl From<&str> for Payload{
    fn from(text: &str) -> Self{
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload{
    fn from(value: serde_json::Value) -> Self{
        Payload::Json(value)
    }
}

/// An encoded frame ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame{
    Binary(Vec<u8>),
    Text(String),
}

impl WireFrame{
    pub fn as_bytes(&self) -> &[u8]{
        match self{
            WireFrame::Binary(bytes) => bytes,
            WireFrame::Text(text) => text.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8>{
        match self{
            WireFrame::Binary(bytes) => bytes,
            WireFrame::Text(text) => text.into_bytes(),
        }
    }
}

impl AsRef<[u8]> for WireFrame{
    fn as_ref(&self) -> &[u8]{
        self.as_bytes()
    }
}

#[derive(Debug, Clone)]
pub struct CodecConfig{
    /// Version byte written into binary frames
    pub version: u8,
    pub string_open: char,
    pub string_close: char,
    pub string_sep: char,
    /// Default source id for the `build_*` helpers
    pub source: u8,
    /// Default destination id for the `build_*` helpers
    pub destination: u8,
}

impl Default for CodecConfig{
    fn default() -> Self{
        CodecConfig{
            version: 0x01,
            string_open: '<',
            string_close: '>',
            string_sep: ',',
            source: 0x00,
            destination: 0xFF,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameCodec{
    config: CodecConfig,
}

pub fn checksum16(data: &[u8]) -> u16{
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

fn encoding_for(as_binary: bool) -> Encoding{
    if as_binary{ Encoding::Binary } else { Encoding::String }
}

impl FrameCodec{
    pub fn new(config: CodecConfig) -> Self{
        FrameCodec{ config }
    }

    pub fn config(&self) -> &CodecConfig{
        &self.config
    }

    pub fn build_reset(&self, as_binary: bool) -> Result<WireFrame>{
        self.build(Command::Reset, self.config.source, self.config.destination, &[], encoding_for(as_binary))
    }

    pub fn build_enter_programming_mode(&self, as_binary: bool) -> Result<WireFrame>{
        self.build(Command::EnterProgrammingMode, self.config.source, self.config.destination, &[], encoding_for(as_binary))
    }

    pub fn build_post(&self, payload: impl Into<Payload>, as_binary: bool) -> Result<WireFrame>{
        let payload = payload.into().into_bytes()?;
        self.build(Command::Post, self.config.source, self.config.destination, &payload, encoding_for(as_binary))
    }

    /// Encode a frame with explicit addressing
    pub fn build(&self, command: Command, source: u8, destination: u8, payload: &[u8], encoding: Encoding) -> Result<WireFrame>{
        match encoding{
            Encoding::Binary => self.build_binary(command, source, destination, payload).map(WireFrame::Binary),
            Encoding::String => self.build_string(command, source, destination, payload).map(WireFrame::Text),
        }
    }

    fn build_binary(&self, command: Command, source: u8, destination: u8, payload: &[u8]) -> Result<Vec<u8>>{
        if payload.len() > MAX_PAYLOAD_LEN{
            return Err(Error::FrameFormat(format!(
                "payload too large for binary frame ({} bytes)", payload.len()
            )));
        }

        let mut frame = Vec::with_capacity(MIN_BINARY_LEN + payload.len());
        frame.extend_from_slice(&MAGIC);
        frame.push(self.config.version);
        frame.push(command as u8);
        frame.push(source);
        frame.push(destination);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);

        let checksum = checksum16(&frame);
        frame.extend_from_slice(&checksum.to_be_bytes());
        Ok(frame)
    }

    fn build_string(&self, command: Command, source: u8, destination: u8, payload: &[u8]) -> Result<String>{
        let sep = self.config.string_sep;
        let mut out = String::new();
        out.push(self.config.string_open);
        out.push_str(&format!("{source}{sep}{destination}{sep}{}", command.name()));

        if !payload.is_empty(){
            let inline = text::encode_payload(payload).ok_or_else(||{
                Error::FrameFormat("payload has no unambiguous string-frame spelling".to_string())
            })?;
            out.push(sep);
            out.push_str(&inline);
        }

        out.push(self.config.string_close);
        Ok(out)
    }

    /// Parse either framing. Input starting with `BR` is binary, anything
    /// else must be UTF-8 text holding a string frame.
    pub fn parse(&self, input: impl AsRef<[u8]>) -> Result<Frame>{
        let data = input.as_ref();
        if data.starts_with(&MAGIC){
            return self.parse_binary(data);
        }

        match std::str::from_utf8(data){
            Ok(text) => self.parse_string(text),
            Err(_) => Err(Error::FrameFormat(
                "neither a binary frame nor UTF-8 text".to_string()
            )),
        }
    }

    /// Like [`parse`](Self::parse) but rejects binary frames with a bad checksum
    pub fn parse_verified(&self, input: impl AsRef<[u8]>) -> Result<Frame>{
        let data = input.as_ref();
        let frame = self.parse(data)?;
        if frame.checksum_valid == Some(false){
            let body = &data[..data.len() - CHECKSUM_LEN];
            let tail = &data[data.len() - CHECKSUM_LEN..];
            return Err(Error::ChecksumMismatch{
                expected: checksum16(body),
                actual: u16::from_be_bytes([tail[0], tail[1]]),
            });
        }
        Ok(frame)
    }

    pub fn parse_binary(&self, data: &[u8]) -> Result<Frame>{
        if data.len() < MIN_BINARY_LEN{
            return Err(Error::FrameFormat(format!("binary frame too short ({} bytes)", data.len())));
        }
        if !data.starts_with(&MAGIC){
            return Err(Error::FrameFormat("missing 'BR' magic".to_string()));
        }

        let version = data[2];
        let cmd_byte = data[3];
        let source = data[4];
        let destination = data[5];
        let len = u16::from_be_bytes([data[6], data[7]]) as usize;

        let expected_len = MIN_BINARY_LEN + len;
        if data.len() != expected_len{
            return Err(Error::FrameFormat(format!(
                "binary length mismatch (expected {expected_len}, got {})", data.len()
            )));
        }

        let payload = data[HEADER_LEN..HEADER_LEN + len].to_vec();
        let received = u16::from_be_bytes([data[HEADER_LEN + len], data[HEADER_LEN + len + 1]]);
        let calculated = checksum16(&data[..HEADER_LEN + len]);

        let command = Command::from_u8(cmd_byte)
            .ok_or_else(|| Error::FrameFormat(format!("unknown command {cmd_byte:#04x}")))?;

        if received != calculated{
            log::debug!("binary frame checksum mismatch: rx={received:#06x} calc={calculated:#06x}");
        }

        Ok(Frame{
            encoding: Encoding::Binary,
            version: Some(version),
            command,
            source,
            destination,
            payload,
            checksum_valid: Some(received == calculated),
        })
    }

    pub fn parse_string(&self, input: &str) -> Result<Frame>{
        let (open, close) = (self.config.string_open, self.config.string_close);
        let s = input.trim();
        if s.len() < open.len_utf8() + close.len_utf8() || !s.starts_with(open) || !s.ends_with(close){
            return Err(Error::FrameFormat(format!("string frame must be wrapped by {open}...{close}")));
        }

        let inner = s[open.len_utf8()..s.len() - close.len_utf8()].trim();
        let parts = text::split_top_level(inner, self.config.string_sep, 3);
        if parts.len() < 3{
            return Err(Error::FrameFormat("string frame needs src,dst,COMMAND".to_string()));
        }

        let source = text::parse_id(parts[0].trim(), "source")?;
        let destination = text::parse_id(parts[1].trim(), "destination")?;
        let cmd_name = parts[2].trim();
        let command = Command::from_name(cmd_name)
            .ok_or_else(|| Error::FrameFormat(format!("unknown command '{cmd_name}'")))?;

        let payload = match parts.get(3).map(|p| p.trim()){
            Some(p) if !p.is_empty() => text::decode_payload(p),
            _ => Vec::new(),
        };

        Ok(Frame{
            encoding: Encoding::String,
            version: None,
            command,
            source,
            destination,
            payload,
            checksum_valid: None,
        })
    }
}
