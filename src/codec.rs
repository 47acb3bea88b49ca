// canconsole/src/codec.rs
//
// Implements the conversion between operator text and frame payloads.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Frame payload codec.
//!
//! Operator commands are transcribed byte for byte into a payload, in the
//! configured character set, with no escaping. A command longer than one
//! frame payload is rejected outright, never truncated or split.
//!
//! Decoding is best effort. Bytes that are not valid in the character set
//! turn into U+FFFD so that noisy device output still reaches the operator.

use crate::{frame::CAN_MAX_DLEN, CodecError};
use itertools::Itertools;
use std::{fmt, str::FromStr};

/// The character shown in place of undecodable payload bytes.
pub const PLACEHOLDER: char = char::REPLACEMENT_CHARACTER;

/// The character set used to transcribe text to payload bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// UTF-8, the default
    #[default]
    Utf8,
    /// ISO 8859-1, one byte per character
    Latin1,
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Charset::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Charset::Latin1),
            _ => Err(format!("unknown charset '{}'", s)),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Charset::Utf8 => f.write_str("utf-8"),
            Charset::Latin1 => f.write_str("latin-1"),
        }
    }
}

/// Converts operator text to payloads and payloads back to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    charset: Charset,
}

impl Codec {
    /// Creates a codec for the character set.
    pub fn new(charset: Charset) -> Self {
        Self { charset }
    }

    /// The configured character set
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Transcribes the text into a frame payload.
    ///
    /// Fails if the encoded text does not fit a single classic CAN frame,
    /// or if a character can not be represented in the character set.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        let payload = match self.charset {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| CodecError::Unrepresentable(c)))
                .collect::<Result<Vec<u8>, _>>()?,
        };

        if payload.len() > CAN_MAX_DLEN {
            return Err(CodecError::InvalidInput {
                len: payload.len(),
                max: CAN_MAX_DLEN,
            });
        }
        Ok(payload)
    }

    /// Transcribes a payload back to text.
    ///
    /// Invalid byte sequences are replaced by [`PLACEHOLDER`].
    pub fn decode(&self, payload: &[u8]) -> String {
        match self.charset {
            Charset::Utf8 => String::from_utf8_lossy(payload).into_owned(),
            Charset::Latin1 => payload.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(Charset::default())
    }
}

/// Renders a payload as space-separated, two-digit, upper case hex.
///
/// ```
/// assert_eq!("50 49 4E 47", canconsole::codec::hex(b"PING"));
/// ```
pub fn hex(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{:02X}", b)).join(" ")
}

/////////////////////////////////////////////////////////////////////////////
