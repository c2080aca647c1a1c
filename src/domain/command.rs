//! Glove Command Protocol
//!
//! The glove speaks a line-oriented ASCII protocol: each sub-command is one
//! letter, a decimal value, and a `$` delimiter. Several sub-commands may be
//! concatenated into a single frame (the batch form), e.g.
//! `A90$B30$C0$D45$E180$` drives all five finger servos in one transmission.

use crate::error::GloveError;
use std::fmt;
use tracing::{debug, warn};

/// Terminator for every sub-command on the wire.
pub const FRAME_DELIMITER: char = '$';

/// Number of finger servos addressed by the batch command (letters A-E).
pub const SERVO_COUNT: usize = 5;

/// Highest addressable servo letter. The wire protocol reserves a sixth
/// letter (`F`) beyond the five fingers driven by the batch command.
pub const MAX_SERVO_INDEX: u8 = 5;

/// Servo travel limit in degrees.
pub const MAX_ANGLE: i32 = 180;

/// RGB channel limit.
pub const MAX_CHANNEL: i32 = 255;

/// A typed command for the glove. Constructed by a caller, consumed once by
/// [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Drive one servo to an absolute angle. Index 0-5 maps to letters A-F.
    SetServo { index: u8, angle: i32 },
    /// Drive all five finger servos in one frame. Must carry exactly
    /// [`SERVO_COUNT`] angles, thumb first.
    SetAllServos { angles: Vec<i32> },
    /// Set the status LED color. `J0$` is appended as the show trigger.
    SetRgb { red: i32, green: i32, blue: i32 },
    /// Turn the buzzer on (`Z1$`).
    BuzzerOn,
    /// Turn the buzzer off (`Z0$`).
    BuzzerOff,
    /// Free text from the operator; the delimiter is appended if missing.
    Raw(String),
}

impl Command {
    /// The neutral open-hand posture sent after a replay run.
    pub fn neutral() -> Self {
        Command::SetAllServos {
            angles: vec![0; SERVO_COUNT],
        }
    }
}

/// The encoded byte sequence actually transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame(String);

impl WireFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for WireFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text decoded from a device response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    pub text: String,
    /// True when the raw bytes were not valid UTF-8 and the text is a
    /// best-effort rendering.
    pub lossy: bool,
}

/// Encode a [`Command`] into the frame transmitted to the glove.
///
/// Pure and total apart from the two rejections: a servo index outside
/// 0-[`MAX_SERVO_INDEX`] and a batch that does not carry exactly
/// [`SERVO_COUNT`] angles. Angles and color channels outside their range are
/// clamped, with a warning, before formatting.
pub fn encode(command: &Command) -> Result<WireFrame, GloveError> {
    let mut out = String::new();
    match command {
        Command::SetServo { index, angle } => {
            push_servo(&mut out, *index, *angle)?;
        }
        Command::SetAllServos { angles } => {
            if angles.len() != SERVO_COUNT {
                return Err(GloveError::InvalidArgument(format!(
                    "batch servo command requires exactly {} angles, got {}",
                    SERVO_COUNT,
                    angles.len()
                )));
            }
            for (index, angle) in angles.iter().enumerate() {
                push_servo(&mut out, index as u8, *angle)?;
            }
        }
        Command::SetRgb { red, green, blue } => {
            push_value(&mut out, 'G', clamp_channel(*red, "red"));
            push_value(&mut out, 'H', clamp_channel(*green, "green"));
            push_value(&mut out, 'I', clamp_channel(*blue, "blue"));
            // J is the show trigger; its value is ignored by the firmware.
            push_value(&mut out, 'J', 0);
        }
        Command::BuzzerOn => push_value(&mut out, 'Z', 1),
        Command::BuzzerOff => push_value(&mut out, 'Z', 0),
        Command::Raw(text) => {
            out.push_str(text);
            if !out.ends_with(FRAME_DELIMITER) {
                out.push(FRAME_DELIMITER);
            }
        }
    }
    Ok(WireFrame(out))
}

/// Decode raw response bytes into text.
///
/// The protocol defines no response grammar beyond free text, so this never
/// fails: invalid UTF-8 degrades to a lossy rendering and is flagged.
pub fn decode(bytes: &[u8]) -> DecodedResponse {
    match std::str::from_utf8(bytes) {
        Ok(text) => DecodedResponse {
            text: text.to_owned(),
            lossy: false,
        },
        Err(_) => {
            debug!("response contained non-UTF-8 bytes, decoding lossily");
            DecodedResponse {
                text: String::from_utf8_lossy(bytes).into_owned(),
                lossy: true,
            }
        }
    }
}

fn push_servo(out: &mut String, index: u8, angle: i32) -> Result<(), GloveError> {
    if index > MAX_SERVO_INDEX {
        return Err(GloveError::InvalidArgument(format!(
            "servo index {} outside 0-{}",
            index, MAX_SERVO_INDEX
        )));
    }
    let clamped = angle.clamp(0, MAX_ANGLE);
    if clamped != angle {
        warn!("angle {} outside 0-{}, clamping to {}", angle, MAX_ANGLE, clamped);
    }
    push_value(out, (b'A' + index) as char, clamped);
    Ok(())
}

fn push_value(out: &mut String, letter: char, value: i32) {
    out.push(letter);
    out.push_str(&value.to_string());
    out.push(FRAME_DELIMITER);
}

fn clamp_channel(value: i32, channel: &str) -> i32 {
    let clamped = value.clamp(0, MAX_CHANNEL);
    if clamped != value {
        warn!(
            "{} channel {} outside 0-{}, clamping to {}",
            channel, value, MAX_CHANNEL, clamped
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_servo_frames_round_trip() {
        for index in 0..=MAX_SERVO_INDEX {
            for angle in [0, 1, 90, 179, 180] {
                let frame = encode(&Command::SetServo { index, angle }).unwrap();
                let expected = format!("{}{}$", (b'A' + index) as char, angle);
                assert_eq!(frame.as_str(), expected);
                let round = decode(frame.as_bytes());
                assert_eq!(round.text, expected);
                assert!(!round.lossy);
            }
        }
    }

    #[test]
    fn out_of_range_angles_clamp_to_bounds() {
        let high = encode(&Command::SetServo { index: 0, angle: 200 }).unwrap();
        assert_eq!(high.as_str(), "A180$");
        let low = encode(&Command::SetServo { index: 0, angle: -5 }).unwrap();
        assert_eq!(low.as_str(), "A0$");
    }

    #[test]
    fn servo_index_out_of_range_is_rejected() {
        let err = encode(&Command::SetServo { index: 6, angle: 90 }).unwrap_err();
        assert!(matches!(err, GloveError::InvalidArgument(_)));
    }

    #[test]
    fn batch_command_uses_letters_a_through_e() {
        let frame = encode(&Command::SetAllServos {
            angles: vec![10, 20, 30, 40, 50],
        })
        .unwrap();
        assert_eq!(frame.as_str(), "A10$B20$C30$D40$E50$");
    }

    #[test]
    fn batch_command_clamps_each_angle() {
        let frame = encode(&Command::SetAllServos {
            angles: vec![-10, 0, 90, 181, 999],
        })
        .unwrap();
        assert_eq!(frame.as_str(), "A0$B0$C90$D180$E180$");
    }

    #[test]
    fn batch_command_requires_exactly_five_angles() {
        for angles in [vec![0; 4], vec![0; 6]] {
            let err = encode(&Command::SetAllServos { angles }).unwrap_err();
            assert!(matches!(err, GloveError::InvalidArgument(_)));
        }
    }

    #[test]
    fn rgb_sets_three_channels_and_show_trigger() {
        let frame = encode(&Command::SetRgb {
            red: 255,
            green: 128,
            blue: 0,
        })
        .unwrap();
        assert_eq!(frame.as_str(), "G255$H128$I0$J0$");
    }

    #[test]
    fn rgb_channels_clamp() {
        let frame = encode(&Command::SetRgb {
            red: 300,
            green: -1,
            blue: 64,
        })
        .unwrap();
        assert_eq!(frame.as_str(), "G255$H0$I64$J0$");
    }

    #[test]
    fn buzzer_frames() {
        assert_eq!(encode(&Command::BuzzerOn).unwrap().as_str(), "Z1$");
        assert_eq!(encode(&Command::BuzzerOff).unwrap().as_str(), "Z0$");
    }

    #[test]
    fn raw_delimiter_append_is_idempotent() {
        let bare = encode(&Command::Raw("A90".into())).unwrap();
        assert_eq!(bare.as_str(), "A90$");
        let delimited = encode(&Command::Raw("A90$".into())).unwrap();
        assert_eq!(delimited.as_str(), "A90$");
    }

    #[test]
    fn neutral_command_opens_the_hand() {
        let frame = encode(&Command::neutral()).unwrap();
        assert_eq!(frame.as_str(), "A0$B0$C0$D0$E0$");
    }

    #[test]
    fn decode_tolerates_invalid_utf8() {
        let decoded = decode(&[b'o', b'k', 0xFF, b'!']);
        assert!(decoded.lossy);
        assert!(decoded.text.starts_with("ok"));
        assert!(decoded.text.ends_with('!'));
    }
}
