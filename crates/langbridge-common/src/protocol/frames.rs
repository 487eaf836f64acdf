//! Frame vocabulary of the wire protocol.
//!
//! Every frame is one line: a 5-digit opcode, a 5-digit correlation id for
//! the opcodes that carry one, then the payload. See
//! [`FrameCodec`](crate::transport::FrameCodec) for the text encoding.

use serde::{Deserialize, Serialize};

use super::error::RemoteError;
use super::types::{Argument, ClassDescriptor, CorrelationId, ReturnValue, TypeTag};

/// Operation codes with stable ordinal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Init = 0,
    RegisterClass = 1,
    CreateObject = 2,
    CallMethod = 3,
    Return = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_ordinal(ordinal: u16) -> Option<Self> {
        Some(match ordinal {
            0 => Opcode::Init,
            1 => Opcode::RegisterClass,
            2 => Opcode::CreateObject,
            3 => Opcode::CallMethod,
            4 => Opcode::Return,
            5 => Opcode::Error,
            _ => return None,
        })
    }

    pub fn ordinal(self) -> u16 {
        self as u16
    }

    /// Whether frames with this opcode carry a correlation id field.
    pub fn has_correlation(self) -> bool {
        matches!(self, Opcode::CallMethod | Opcode::Return | Opcode::Error)
    }
}

/// Payload of `Init`: the endpoint's overload-matching strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPayload {
    #[serde(rename = "strictTypes")]
    pub strict_types: bool,
}

/// Payload of `CreateObject`, both from a requester and as a construct instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateObjectPayload {
    /// Class name
    pub name: String,
    #[serde(rename = "varName")]
    pub var_name: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

/// Payload of `CallMethod`, both from a requester and as a call instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMethodPayload {
    /// Method name
    pub name: String,
    #[serde(rename = "varName")]
    pub var_name: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

/// Payload of `Return`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnPayload {
    #[serde(rename = "returnID")]
    pub return_id: CorrelationId,
    #[serde(rename = "returnVal")]
    pub return_val: String,
    #[serde(rename = "returnType")]
    pub return_type: TypeTag,
}

impl ReturnPayload {
    pub fn new(return_id: CorrelationId, value: ReturnValue) -> Self {
        Self {
            return_id,
            return_val: value.value,
            return_type: value.tag,
        }
    }

    pub fn value(&self) -> ReturnValue {
        ReturnValue::new(self.return_val.clone(), self.return_type.clone())
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Init(InitPayload),
    RegisterClass(ClassDescriptor),
    CreateObject(CreateObjectPayload),
    CallMethod {
        correlation: CorrelationId,
        payload: CallMethodPayload,
    },
    Return {
        correlation: CorrelationId,
        payload: ReturnPayload,
    },
    Error {
        correlation: CorrelationId,
        message: String,
    },
}

impl Frame {
    pub fn opcode(&self) -> Opcode {
        match self {
            Frame::Init(_) => Opcode::Init,
            Frame::RegisterClass(_) => Opcode::RegisterClass,
            Frame::CreateObject(_) => Opcode::CreateObject,
            Frame::CallMethod { .. } => Opcode::CallMethod,
            Frame::Return { .. } => Opcode::Return,
            Frame::Error { .. } => Opcode::Error,
        }
    }

    /// Correlation id field, for opcodes that carry one.
    pub fn correlation(&self) -> Option<CorrelationId> {
        match self {
            Frame::CallMethod { correlation, .. }
            | Frame::Return { correlation, .. }
            | Frame::Error { correlation, .. } => Some(*correlation),
            _ => None,
        }
    }

    pub fn init(strict_types: bool) -> Self {
        Frame::Init(InitPayload { strict_types })
    }

    pub fn create_object(
        class_name: impl Into<String>,
        var_name: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        Frame::CreateObject(CreateObjectPayload {
            name: class_name.into(),
            var_name: var_name.into(),
            arguments,
        })
    }

    pub fn call_method(
        correlation: CorrelationId,
        var_name: impl Into<String>,
        method: impl Into<String>,
        arguments: Vec<Argument>,
    ) -> Self {
        Frame::CallMethod {
            correlation,
            payload: CallMethodPayload {
                name: method.into(),
                var_name: var_name.into(),
                arguments,
            },
        }
    }

    pub fn return_value(correlation: CorrelationId, value: ReturnValue) -> Self {
        Frame::Return {
            correlation,
            payload: ReturnPayload::new(correlation, value),
        }
    }

    pub fn error(correlation: CorrelationId, error: &RemoteError) -> Self {
        Frame::Error {
            correlation,
            message: error.to_string(),
        }
    }
}
