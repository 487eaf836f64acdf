pub mod error;
pub mod frames;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{BridgeError, ErrorKind, NoMatchError, RemoteError, Result};
pub use frames::{
    CallMethodPayload, CreateObjectPayload, Frame, InitPayload, Opcode, ReturnPayload,
};
pub use types::{
    Argument, ClassDescriptor, ConstructorSignature, CorrelationId, EndpointId,
    MethodSignature, ReturnValue, TypeTag, MAX_CORRELATION_ID, NO_RETURN,
};
