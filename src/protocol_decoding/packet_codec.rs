//! Decoder registry.
//!
//! A [`PacketCodec`] maps each [`ProtocolMode`] to one [`Decoder`]. Relay
//! sessions only ever call [`PacketCodec::decode`]; adding a protocol means
//! registering another decoder, never touching the session code.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;

use super::hamlib::HamlibDecoder;
use super::types::ProtocolMode;
use crate::data_capture::types::Direction;
use crate::error_handling::types::CodecError;

/// Turns the trimmed text of one payload into a human readable meaning.
///
/// Implementations are stateless: the same input always produces the same
/// output and nothing is remembered between calls. Returning `None` means the
/// payload is not part of the grammar; decoders never fail.
pub trait Decoder: Send + Sync {
    fn decode(&self, direction: Direction, text: &str) -> Option<String>;
}

pub struct PacketCodec {
    decoders: HashMap<ProtocolMode, Arc<dyn Decoder>>,
}

impl PacketCodec {
    /// A registry with no decoders; every mode behaves like `raw`.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// The registry with every built-in decoder.
    pub fn with_builtin_decoders() -> Result<Self, CodecError> {
        let mut codec = Self::empty();
        codec.register(ProtocolMode::Hamlib, Arc::new(HamlibDecoder::new()?));
        Ok(codec)
    }

    /// Registers `decoder` for `mode`, replacing any previous one. `raw` can
    /// not be overridden.
    pub fn register(&mut self, mode: ProtocolMode, decoder: Arc<dyn Decoder>) {
        if mode != ProtocolMode::Raw {
            self.decoders.insert(mode, decoder);
        }
    }

    pub fn decode(&self, direction: Direction, raw: &[u8], mode: ProtocolMode) -> Option<String> {
        let decoder = self.decoders.get(&mode)?;

        let text = match std::str::from_utf8(raw) {
            Ok(t) => t.trim(),
            Err(_) => {
                trace!("[{}] unrecognized: {} bytes of binary payload", mode, raw.len());
                return None;
            }
        };
        if text.is_empty() {
            return None;
        }

        let semantic = decoder.decode(direction, text);
        if semantic.is_none() {
            trace!("[{}] unrecognized {} payload: {:?}", mode, direction, text);
        }
        semantic
    }
}
