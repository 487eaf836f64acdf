use serde::de::DeserializeOwned;

use crate::protocol::error::{BridgeError, Result};
use crate::protocol::frames::{Frame, Opcode, ReturnPayload};
use crate::protocol::types::MAX_CORRELATION_ID;

/// Width of the opcode and correlation id header fields.
const FIELD_WIDTH: usize = 5;

/// Line codec for protocol frames.
///
/// Wire format (one frame per line, newline not included here):
///
/// ```text
/// OOOOO[RRRRR]PAYLOAD
/// ```
///
/// `OOOOO` is the zero-padded opcode ordinal. `RRRRR` is the zero-padded
/// correlation id, present only for `CallMethod`, `Return` and `Error`.
/// The payload is a compact JSON object, except for `Error` whose payload
/// is plain text.
///
/// # Example
///
/// ```
/// use langbridge_common::protocol::Frame;
/// use langbridge_common::transport::FrameCodec;
///
/// let line = FrameCodec::encode(&Frame::init(true)).unwrap();
/// assert_eq!(line, r#"00000{"strictTypes":true}"#);
///
/// let decoded = FrameCodec::decode(&line).unwrap();
/// assert_eq!(decoded, Frame::init(true));
/// ```
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a frame to a single line without the trailing newline.
    pub fn encode(frame: &Frame) -> Result<String> {
        let opcode = frame.opcode();
        let mut line = format!("{:05}", opcode.ordinal());

        if let Some(correlation) = frame.correlation() {
            if correlation > MAX_CORRELATION_ID {
                return Err(BridgeError::InvalidRequest(format!(
                    "correlation id {} does not fit the {}-digit field",
                    correlation, FIELD_WIDTH
                )));
            }
            line.push_str(&format!("{:05}", correlation));
        }

        let payload = match frame {
            Frame::Init(payload) => serde_json::to_string(payload)?,
            Frame::RegisterClass(descriptor) => serde_json::to_string(descriptor)?,
            Frame::CreateObject(payload) => serde_json::to_string(payload)?,
            Frame::CallMethod { payload, .. } => serde_json::to_string(payload)?,
            Frame::Return { payload, .. } => serde_json::to_string(payload)?,
            // Keep the diagnostic on one line
            Frame::Error { message, .. } => message.replace(['\r', '\n'], " "),
        };
        line.push_str(&payload);

        Ok(line)
    }

    /// Decodes one line (a trailing `\n` or `\r\n` is ignored).
    pub fn decode(line: &str) -> Result<Frame> {
        let line = line.trim_end_matches(['\r', '\n']);

        let ordinal = Self::field(line, 0, "opcode")?;
        let opcode = u16::try_from(ordinal)
            .ok()
            .and_then(Opcode::from_ordinal)
            .ok_or_else(|| BridgeError::MalformedFrame(format!("unknown opcode {:05}", ordinal)))?;

        let (correlation, payload) = if opcode.has_correlation() {
            let correlation = Self::field(line, FIELD_WIDTH, "correlation id")?;
            (correlation, &line[2 * FIELD_WIDTH..])
        } else {
            (0, &line[FIELD_WIDTH..])
        };

        let frame = match opcode {
            Opcode::Init => Frame::Init(Self::payload(opcode, payload)?),
            Opcode::RegisterClass => Frame::RegisterClass(Self::payload(opcode, payload)?),
            Opcode::CreateObject => Frame::CreateObject(Self::payload(opcode, payload)?),
            Opcode::CallMethod => Frame::CallMethod {
                correlation,
                payload: Self::payload(opcode, payload)?,
            },
            Opcode::Return => {
                let payload: ReturnPayload = Self::payload(opcode, payload)?;
                if payload.return_id != correlation {
                    return Err(BridgeError::MalformedFrame(format!(
                        "Return header id {} disagrees with returnID {}",
                        correlation, payload.return_id
                    )));
                }
                Frame::Return {
                    correlation,
                    payload,
                }
            }
            Opcode::Error => Frame::Error {
                correlation,
                message: payload.to_string(),
            },
        };

        Ok(frame)
    }

    /// Reads one zero-padded 5-digit decimal field starting at `start`.
    fn field(line: &str, start: usize, what: &str) -> Result<u32> {
        let digits = line
            .get(start..start + FIELD_WIDTH)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| {
                BridgeError::MalformedFrame(format!(
                    "expected {}-digit {} at offset {}",
                    FIELD_WIDTH, what, start
                ))
            })?;
        digits
            .parse::<u32>()
            .map_err(|e| BridgeError::MalformedFrame(format!("bad {}: {}", what, e)))
    }

    fn payload<T: DeserializeOwned>(opcode: Opcode, payload: &str) -> Result<T> {
        serde_json::from_str(payload)
            .map_err(|e| BridgeError::MalformedFrame(format!("{:?} payload: {}", opcode, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Argument, ClassDescriptor, ReturnValue, TypeTag};

    #[test]
    fn test_init_has_no_correlation_field() {
        let line = FrameCodec::encode(&Frame::init(false)).unwrap();
        assert_eq!(line, r#"00000{"strictTypes":false}"#);
    }

    #[test]
    fn test_call_method_wire_layout() {
        let frame = Frame::call_method(42, "calc", "add", vec![Argument::from(1), Argument::from("x")]);
        let line = FrameCodec::encode(&frame).unwrap();
        assert_eq!(
            line,
            r#"0000300042{"name":"add","varName":"calc","arguments":[{"1":"int"},{"x":"string"}]}"#
        );
        assert_eq!(FrameCodec::decode(&line).unwrap(), frame);
    }

    #[test]
    fn test_register_class_uses_return_key() {
        let descriptor = ClassDescriptor::new("Dog")
            .with_constructor([TypeTag::String])
            .with_method("bark", [], TypeTag::String);
        let line = FrameCodec::encode(&Frame::RegisterClass(descriptor.clone())).unwrap();
        assert!(line.starts_with("00001{"));
        assert!(line.contains(r#""return":"string""#));
        assert!(line.contains(r#""constructors":[["string"]]"#));
        assert_eq!(FrameCodec::decode(&line).unwrap(), Frame::RegisterClass(descriptor));
    }

    #[test]
    fn test_return_frame_carries_id_twice() {
        let frame = Frame::return_value(7, ReturnValue::new("this is a string", TypeTag::String));
        let line = FrameCodec::encode(&frame).unwrap();
        assert_eq!(
            line,
            r#"0000400007{"returnID":7,"returnVal":"this is a string","returnType":"string"}"#
        );
        assert_eq!(FrameCodec::decode(&line).unwrap(), frame);
    }

    #[test]
    fn test_return_id_mismatch_is_malformed() {
        let line = r#"0000400007{"returnID":8,"returnVal":"1","returnType":"int"}"#;
        assert!(matches!(
            FrameCodec::decode(line),
            Err(BridgeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_error_payload_is_plain_text() {
        let line = "0000500003UnknownHandle: unknown object handle 'x'";
        match FrameCodec::decode(line).unwrap() {
            Frame::Error { correlation, message } => {
                assert_eq!(correlation, 3);
                assert_eq!(message, "UnknownHandle: unknown object handle 'x'");
            }
            other => panic!("Expected Error frame, got {:?}", other),
        }
    }

    #[test]
    fn test_error_message_is_flattened_to_one_line() {
        let frame = Frame::Error {
            correlation: 0,
            message: "first\nsecond\r\nthird".to_string(),
        };
        let line = FrameCodec::encode(&frame).unwrap();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
    }

    #[test]
    fn test_crlf_line_ending_is_accepted() {
        let decoded = FrameCodec::decode("00000{\"strictTypes\":true}\r\n").unwrap();
        assert_eq!(decoded, Frame::init(true));
    }

    #[test]
    fn test_unknown_opcode_is_malformed() {
        assert!(matches!(
            FrameCodec::decode("00009{}"),
            Err(BridgeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_short_or_non_numeric_header_is_malformed() {
        for line in ["", "000", "0a003{}", "00003", "000030001{}", "00003ab123{}"] {
            assert!(
                matches!(FrameCodec::decode(line), Err(BridgeError::MalformedFrame(_))),
                "expected MalformedFrame for {:?}",
                line
            );
        }
    }

    #[test]
    fn test_non_ascii_header_does_not_panic() {
        assert!(FrameCodec::decode("ééééé{}").is_err());
    }

    #[test]
    fn test_bad_json_payload_is_malformed() {
        assert!(matches!(
            FrameCodec::decode("00002{\"name\":"),
            Err(BridgeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_oversized_correlation_is_rejected_on_encode() {
        let frame = Frame::call_method(100_000, "v", "m", vec![]);
        assert!(matches!(
            FrameCodec::encode(&frame),
            Err(BridgeError::InvalidRequest(_))
        ));
    }
}
