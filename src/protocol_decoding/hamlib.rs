//! Hamlib `rigctld` command grammar.
//!
//! Short commands are a single letter, optionally followed by whitespace and
//! arguments: an uppercase letter sets a value, the lowercase letter reads it.
//! Long commands start with a backslash. A leading `+` (extended response
//! mode) is accepted everywhere.
//!
//! One TCP chunk may carry several newline separated commands or reply
//! lines; only the first line is decoded.

use regex::Regex;

use super::packet_codec::Decoder;
use crate::data_capture::types::Direction;
use crate::error_handling::types::CodecError;

const PATTERNS: &[(&str, &str)] = &[
    (r"^\+?F\s+(\d+)\s*$", "SET FREQ"),
    (r"^\+?f(?:\s|$)", "GET FREQ"),
    (r"^\+?M\s+(\w+)\s+(-?\d+)\s*$", "SET MODE"),
    (r"^\+?m(?:\s|$)", "GET MODE"),
    (r"^\+?L\s+(\w+)\s+(-?[\d.]+)\s*$", "SET LEVEL"),
    (r"^\+?l\s+(\w+)\s*$", "GET LEVEL"),
    (r"^\+?T\s+([01])\s*$", "SET PTT"),
    (r"^\+?t(?:\s|$)", "GET PTT"),
    (r"^\+?V\s+(\w+)\s*$", "SET VFO"),
    (r"^\+?v(?:\s|$)", "GET VFO"),
    (r"^\+?\\set_freq\s+(\d+)\s*$", "SET FREQ"),
    (r"^\+?\\get_freq(?:\s|$)", "GET FREQ"),
    (r"^\+?\\set_mode\s+(\w+)\s+(-?\d+)\s*$", "SET MODE"),
    (r"^\+?\\get_mode(?:\s|$)", "GET MODE"),
    (r"^\+?\\set_ptt\s+([01])\s*$", "SET PTT"),
    (r"^\+?\\get_ptt(?:\s|$)", "GET PTT"),
    (r"^\+?\\dump_state(?:\s|$)", "DUMP STATE"),
    (r"^\+?\\dump_caps(?:\s|$)", "DUMP CAPS"),
    (r"^\+?\\get_powerstat(?:\s|$)", "GET POWERSTAT"),
    (r"^\+?\\chk_vfo(?:\s|$)", "CHECK VFO"),
    (r"^\+?\\set_vfo\s+(\w+)\s*$", "SET VFO"),
    (r"^\+?\\get_vfo(?:\s|$)", "GET VFO"),
    (r"^RPRT\s+0(?:\s|$)", "SUCCESS"),
    (r"^RPRT\s+-(\d+)(?:\s|$)", "ERROR"),
];

pub struct HamlibDecoder {
    patterns: Vec<(Regex, &'static str)>,
    frequency_reply: Regex,
}

impl HamlibDecoder {
    pub fn new() -> Result<Self, CodecError> {
        let patterns = PATTERNS
            .iter()
            .map(|(pattern, label)| Ok((Regex::new(pattern)?, *label)))
            .collect::<Result<Vec<_>, CodecError>>()?;

        Ok(Self {
            patterns,
            frequency_reply: Regex::new(r"^\d{7,}$")?,
        })
    }
}

impl Decoder for HamlibDecoder {
    fn decode(&self, direction: Direction, text: &str) -> Option<String> {
        let line = text.lines().next().unwrap_or(text).trim_end();

        for (pattern, label) in &self.patterns {
            if let Some(caps) = pattern.captures(line) {
                let args: Vec<&str> = caps.iter().skip(1).flatten().map(|m| m.as_str()).collect();
                return Some(if args.is_empty() {
                    label.to_string()
                } else {
                    format!("{}: {}", label, args.join(" "))
                });
            }
        }

        // a bare frequency is what the rig answers to `f`
        if direction == Direction::Rx && self.frequency_reply.is_match(line) {
            return Some(format!("DATA: {} Hz", line));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(text: &str) -> Option<String> {
        HamlibDecoder::new().unwrap().decode(Direction::Tx, text)
    }

    fn rx(text: &str) -> Option<String> {
        HamlibDecoder::new().unwrap().decode(Direction::Rx, text)
    }

    #[test]
    fn standard_commands() {
        assert_eq!(tx("F 14074000").as_deref(), Some("SET FREQ: 14074000"));
        assert_eq!(tx("f").as_deref(), Some("GET FREQ"));
        assert_eq!(tx("M USB 2400").as_deref(), Some("SET MODE: USB 2400"));
        assert_eq!(tx("m").as_deref(), Some("GET MODE"));
        assert_eq!(tx("L AF 0.5").as_deref(), Some("SET LEVEL: AF 0.5"));
        assert_eq!(tx("l AF").as_deref(), Some("GET LEVEL: AF"));
        assert_eq!(tx("T 1").as_deref(), Some("SET PTT: 1"));
        assert_eq!(tx("t").as_deref(), Some("GET PTT"));
        assert_eq!(tx("V VFOA").as_deref(), Some("SET VFO: VFOA"));
        assert_eq!(tx("+f").as_deref(), Some("GET FREQ"));
    }

    #[test]
    fn extended_commands() {
        assert_eq!(tx("\\dump_state").as_deref(), Some("DUMP STATE"));
        assert_eq!(tx("\\dump_caps").as_deref(), Some("DUMP CAPS"));
        assert_eq!(tx("\\get_powerstat").as_deref(), Some("GET POWERSTAT"));
        assert_eq!(tx("\\chk_vfo").as_deref(), Some("CHECK VFO"));
        assert_eq!(tx("\\set_vfo VFOA").as_deref(), Some("SET VFO: VFOA"));
        assert_eq!(tx("\\get_vfo").as_deref(), Some("GET VFO"));
        assert_eq!(tx("\\set_freq 7074000").as_deref(), Some("SET FREQ: 7074000"));
    }

    #[test]
    fn responses() {
        assert_eq!(rx("RPRT 0").as_deref(), Some("SUCCESS"));
        assert_eq!(rx("RPRT -5").as_deref(), Some("ERROR: 5"));
        assert_eq!(rx("14074000").as_deref(), Some("DATA: 14074000 Hz"));
        // a bare number sent by the client is not a frequency reply
        assert_eq!(tx("14074000"), None);
        assert_eq!(rx("1234"), None);
    }

    #[test]
    fn batched_lines_decode_the_first_one() {
        assert_eq!(tx("F 14200000\nf").as_deref(), Some("SET FREQ: 14200000"));
        assert_eq!(tx("M USB 2400\r\nm").as_deref(), Some("SET MODE: USB 2400"));
        assert_eq!(tx("\\set_ptt 1\n\\get_ptt").as_deref(), Some("SET PTT: 1"));
        assert_eq!(rx("RPRT 0\n14074000").as_deref(), Some("SUCCESS"));
        assert_eq!(rx("14074000\nRPRT 0").as_deref(), Some("DATA: 14074000 Hz"));
        // a malformed first line is not rescued by the ones after it
        assert_eq!(tx("F abc\nf"), None);
    }

    #[test]
    fn unknown_commands_have_no_meaning() {
        assert_eq!(tx("Q"), None);
        assert_eq!(tx("UNKNOWN COMMAND"), None);
        assert_eq!(tx("fx"), None);
    }

    #[test]
    fn malformed_arguments_have_no_meaning() {
        assert_eq!(tx("F abc"), None);
        assert_eq!(tx("F"), None);
        assert_eq!(tx("T 7"), None);
        assert_eq!(tx("M USB wide"), None);
    }
}
