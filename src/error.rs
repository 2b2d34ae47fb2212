//!
//! Defines error types for the runtime host.
//!
//! Every failure crosses the `Call` boundary as an explicit `HostError`. The variant tells
//! the caller whether to retry the same round, advance past it, or halt the runtime.

use crate::protocol::WireError;
use crate::storage::StorageError;

/// Module name used on the wire for errors originating in the host itself.
pub const HOST_ERROR_MODULE: &str = "host";

/// Request-shape violations. Always rejected before any work is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A request body must populate exactly one variant.
    #[error("malformed body: {populated} variants populated, expected exactly one")]
    Malformed { populated: usize },
    /// A remote runtime rejected the body as malformed.
    #[error("malformed body: {0}")]
    MalformedRemote(String),
    /// The populated variant is not one the runtime knows how to serve.
    #[error("method not supported: {0}")]
    UnsupportedMethod(String),
    /// The request targets a round that cannot follow the given block.
    #[error("invalid round: {0}")]
    InvalidRound(String),
    /// The peer speaks an incompatible protocol version or is a different runtime.
    #[error("incompatible peer: {0}")]
    Incompatible(String),
}

/// An error reported by a runtime, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("runtime error (module: {module}, code: {code}): {message}")]
pub struct RuntimeError {
    pub module: String,
    pub code: u32,
    pub message: String,
}

/// Represents errors that can occur while hosting a runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Malformed or unsupported request.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    /// `Call` before `Start` completed, or after `Stop`.
    #[error("runtime is not ready")]
    NotReady,
    /// The batch tree failed; no partial commitment was produced.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    /// Batch execution failed for a reason other than storage.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The caller cancelled the call, its deadline passed, or the runtime was aborted.
    #[error("call cancelled")]
    Cancelled,
    /// The remote runtime reported an error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// Wire encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
    /// Invalid host configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HostError {
    /// Whether a fresh attempt for the same round is legitimate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HostError::Cancelled)
    }

    /// Stable wire code for errors raised by the host.
    pub fn code(&self) -> u32 {
        match self {
            HostError::Protocol(ProtocolError::Malformed { .. } | ProtocolError::MalformedRemote(_)) => 1,
            HostError::Protocol(ProtocolError::UnsupportedMethod(_)) => 2,
            HostError::Protocol(ProtocolError::InvalidRound(_)) => 3,
            HostError::Protocol(ProtocolError::Incompatible(_)) => 10,
            HostError::NotReady => 4,
            HostError::Storage(_) => 5,
            HostError::Execution(_) => 6,
            HostError::Cancelled => 7,
            HostError::Runtime(e) => e.code,
            HostError::Codec(_) => 8,
            HostError::Config(_) => 9,
        }
    }

    /// Converts the error into its wire form.
    pub fn to_wire(&self) -> WireError {
        match self {
            HostError::Runtime(e) => WireError {
                module: e.module.clone(),
                code: e.code,
                message: e.message.clone(),
            },
            other => WireError {
                module: HOST_ERROR_MODULE.to_string(),
                code: other.code(),
                message: other.detail(),
            },
        }
    }

    /// The message carried on the wire: the variant's payload without the kind prefix.
    fn detail(&self) -> String {
        match self {
            HostError::Protocol(
                ProtocolError::MalformedRemote(m)
                | ProtocolError::UnsupportedMethod(m)
                | ProtocolError::InvalidRound(m)
                | ProtocolError::Incompatible(m),
            )
            | HostError::Execution(m)
            | HostError::Codec(m)
            | HostError::Config(m) => m.clone(),
            HostError::Protocol(e) => e.to_string(),
            HostError::Storage(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Reconstructs an error received on the wire.
    ///
    /// Every host-module code maps back to its kind, with the wire message as payload.
    /// Errors from other modules, and unknown host codes, surface as `HostError::Runtime`.
    pub fn from_wire(err: WireError) -> Self {
        if err.module != HOST_ERROR_MODULE {
            return HostError::Runtime(RuntimeError { module: err.module, code: err.code, message: err.message });
        }
        let message = err.message;
        match err.code {
            1 => ProtocolError::MalformedRemote(message).into(),
            2 => ProtocolError::UnsupportedMethod(message).into(),
            3 => ProtocolError::InvalidRound(message).into(),
            10 => ProtocolError::Incompatible(message).into(),
            4 => HostError::NotReady,
            5 => StorageError::Remote(message).into(),
            6 => HostError::Execution(message),
            7 => HostError::Cancelled,
            8 => HostError::Codec(message),
            9 => HostError::Config(message),
            code => HostError::Runtime(RuntimeError { module: HOST_ERROR_MODULE.to_string(), code, message }),
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(e: serde_json::Error) -> Self {
        HostError::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancellation_is_retryable() {
        assert!(HostError::Cancelled.is_retryable());
        assert!(!HostError::NotReady.is_retryable());
        assert!(!HostError::Execution("boom".into()).is_retryable());
        assert!(!HostError::Protocol(ProtocolError::Malformed { populated: 0 }).is_retryable());
    }

    #[test]
    fn test_wire_roundtrip_preserves_kind() {
        let back = HostError::from_wire(HostError::NotReady.to_wire());
        assert_eq!(back, HostError::NotReady);
        let back = HostError::from_wire(HostError::Cancelled.to_wire());
        assert_eq!(back, HostError::Cancelled);

        let remote = RuntimeError { module: "mock".into(), code: 1, message: "nope".into() };
        let back = HostError::from_wire(HostError::Runtime(remote.clone()).to_wire());
        assert_eq!(back, HostError::Runtime(remote));
    }

    #[test]
    fn test_host_codes_map_back_to_their_kind() {
        let cases = vec![
            HostError::Protocol(ProtocolError::UnsupportedMethod("Foo".into())),
            HostError::Protocol(ProtocolError::InvalidRound("round 3 after 7".into())),
            HostError::Protocol(ProtocolError::Incompatible("protocol 9.0.0".into())),
            HostError::Execution("boom".into()),
            HostError::Codec("bad frame".into()),
            HostError::Config("event_buffer".into()),
        ];
        for err in cases {
            assert_eq!(HostError::from_wire(err.to_wire()), err);
        }

        let back = HostError::from_wire(HostError::Protocol(ProtocolError::Malformed { populated: 2 }).to_wire());
        assert!(matches!(back, HostError::Protocol(ProtocolError::MalformedRemote(ref m)) if m.contains('2')));
        assert_eq!(back.code(), 1);

        let back = HostError::from_wire(HostError::Storage(StorageError::Unavailable("disk".into())).to_wire());
        assert_eq!(back, HostError::Storage(StorageError::Remote("storage unavailable: disk".into())));
        assert!(!back.is_retryable());

        let unknown = WireError { module: HOST_ERROR_MODULE.into(), code: 99, message: "?".into() };
        assert!(matches!(HostError::from_wire(unknown), HostError::Runtime(RuntimeError { code: 99, .. })));
    }

    #[test]
    fn test_unsupported_method_wire_code() {
        let wire = HostError::Protocol(ProtocolError::UnsupportedMethod("Foo".into())).to_wire();
        assert_eq!(wire.module, HOST_ERROR_MODULE);
        assert_eq!(wire.code, 2);
        assert!(wire.message.contains("Foo"));
    }
}
