//!
//! Runtime host wire protocol.
//!
//! `Body` is the typed sum of every request and response. `RawBody` is its wire shape:
//! one optional field per variant, plus an open map for variants this host does not
//! know. Converting `RawBody` into `Body` enforces that exactly one field is populated,
//! so a malformed body is rejected before any work is attempted.

pub mod types;

pub use types::*;

use std::collections::BTreeMap;

use crate::error::{HostError, ProtocolError};

pub const METHOD_EXECUTE_TX_BATCH_REQUEST: &str = "RuntimeExecuteTxBatchRequest";
pub const METHOD_EXECUTE_TX_BATCH_RESPONSE: &str = "RuntimeExecuteTxBatchResponse";
pub const METHOD_CHECK_TX_BATCH_REQUEST: &str = "RuntimeCheckTxBatchRequest";
pub const METHOD_CHECK_TX_BATCH_RESPONSE: &str = "RuntimeCheckTxBatchResponse";
pub const METHOD_QUERY_REQUEST: &str = "RuntimeQueryRequest";
pub const METHOD_QUERY_RESPONSE: &str = "RuntimeQueryResponse";
pub const METHOD_CONSENSUS_SYNC_REQUEST: &str = "RuntimeConsensusSyncRequest";
pub const METHOD_CONSENSUS_SYNC_RESPONSE: &str = "RuntimeConsensusSyncResponse";
pub const METHOD_INFO_REQUEST: &str = "RuntimeInfoRequest";
pub const METHOD_INFO_RESPONSE: &str = "RuntimeInfoResponse";
pub const METHOD_ABORT_REQUEST: &str = "RuntimeAbortRequest";
pub const METHOD_ABORT_RESPONSE: &str = "RuntimeAbortResponse";
pub const METHOD_ERROR: &str = "Error";

/// Error as carried on the wire. Code 0 means "no error".
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireError {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Typed protocol body: exactly one variant by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    ExecuteTxBatchRequest(ExecuteTxBatchRequest),
    ExecuteTxBatchResponse(ExecuteTxBatchResponse),
    CheckTxBatchRequest(CheckTxBatchRequest),
    CheckTxBatchResponse(CheckTxBatchResponse),
    QueryRequest(QueryRequest),
    QueryResponse(QueryResponse),
    ConsensusSyncRequest(ConsensusSyncRequest),
    ConsensusSyncResponse(Empty),
    InfoRequest(RuntimeInfoRequest),
    InfoResponse(RuntimeInfoResponse),
    AbortRequest(Empty),
    AbortResponse(Empty),
    Error(WireError),
    /// A variant this host does not know. Kept so newer peers can be answered with
    /// `UnsupportedMethod` instead of a decoding failure.
    Other { method: String, payload: serde_json::Value },
}

impl Body {
    /// Wire name of the populated variant.
    pub fn method(&self) -> &str {
        match self {
            Body::ExecuteTxBatchRequest(_) => METHOD_EXECUTE_TX_BATCH_REQUEST,
            Body::ExecuteTxBatchResponse(_) => METHOD_EXECUTE_TX_BATCH_RESPONSE,
            Body::CheckTxBatchRequest(_) => METHOD_CHECK_TX_BATCH_REQUEST,
            Body::CheckTxBatchResponse(_) => METHOD_CHECK_TX_BATCH_RESPONSE,
            Body::QueryRequest(_) => METHOD_QUERY_REQUEST,
            Body::QueryResponse(_) => METHOD_QUERY_RESPONSE,
            Body::ConsensusSyncRequest(_) => METHOD_CONSENSUS_SYNC_REQUEST,
            Body::ConsensusSyncResponse(_) => METHOD_CONSENSUS_SYNC_RESPONSE,
            Body::InfoRequest(_) => METHOD_INFO_REQUEST,
            Body::InfoResponse(_) => METHOD_INFO_RESPONSE,
            Body::AbortRequest(_) => METHOD_ABORT_REQUEST,
            Body::AbortResponse(_) => METHOD_ABORT_RESPONSE,
            Body::Error(_) => METHOD_ERROR,
            Body::Other { method, .. } => method,
        }
    }

    /// Encodes the body as JSON in its wire shape.
    pub fn encode(&self) -> Result<Vec<u8>, HostError> {
        Ok(serde_json::to_vec(&RawBody::from(self.clone()))?)
    }

    /// Decodes and validates a wire body.
    pub fn decode(bytes: &[u8]) -> Result<Body, HostError> {
        let raw: RawBody = serde_json::from_slice(bytes)?;
        Ok(Body::try_from(raw)?)
    }
}

/// Wire shape of a `Body`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawBody {
    #[serde(rename = "RuntimeExecuteTxBatchRequest", default, skip_serializing_if = "Option::is_none")]
    pub execute_tx_batch_request: Option<ExecuteTxBatchRequest>,
    #[serde(rename = "RuntimeExecuteTxBatchResponse", default, skip_serializing_if = "Option::is_none")]
    pub execute_tx_batch_response: Option<ExecuteTxBatchResponse>,
    #[serde(rename = "RuntimeCheckTxBatchRequest", default, skip_serializing_if = "Option::is_none")]
    pub check_tx_batch_request: Option<CheckTxBatchRequest>,
    #[serde(rename = "RuntimeCheckTxBatchResponse", default, skip_serializing_if = "Option::is_none")]
    pub check_tx_batch_response: Option<CheckTxBatchResponse>,
    #[serde(rename = "RuntimeQueryRequest", default, skip_serializing_if = "Option::is_none")]
    pub query_request: Option<QueryRequest>,
    #[serde(rename = "RuntimeQueryResponse", default, skip_serializing_if = "Option::is_none")]
    pub query_response: Option<QueryResponse>,
    #[serde(rename = "RuntimeConsensusSyncRequest", default, skip_serializing_if = "Option::is_none")]
    pub consensus_sync_request: Option<ConsensusSyncRequest>,
    #[serde(rename = "RuntimeConsensusSyncResponse", default, skip_serializing_if = "Option::is_none")]
    pub consensus_sync_response: Option<Empty>,
    #[serde(rename = "RuntimeInfoRequest", default, skip_serializing_if = "Option::is_none")]
    pub info_request: Option<RuntimeInfoRequest>,
    #[serde(rename = "RuntimeInfoResponse", default, skip_serializing_if = "Option::is_none")]
    pub info_response: Option<RuntimeInfoResponse>,
    #[serde(rename = "RuntimeAbortRequest", default, skip_serializing_if = "Option::is_none")]
    pub abort_request: Option<Empty>,
    #[serde(rename = "RuntimeAbortResponse", default, skip_serializing_if = "Option::is_none")]
    pub abort_response: Option<Empty>,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    /// Variants unknown to this host, keyed by wire name.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl RawBody {
    /// Number of populated variants. A JSON `null` does not count as populated.
    pub fn populated(&self) -> usize {
        let known = [
            self.execute_tx_batch_request.is_some(),
            self.execute_tx_batch_response.is_some(),
            self.check_tx_batch_request.is_some(),
            self.check_tx_batch_response.is_some(),
            self.query_request.is_some(),
            self.query_response.is_some(),
            self.consensus_sync_request.is_some(),
            self.consensus_sync_response.is_some(),
            self.info_request.is_some(),
            self.info_response.is_some(),
            self.abort_request.is_some(),
            self.abort_response.is_some(),
            self.error.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        known + self.other.values().filter(|v| !v.is_null()).count()
    }
}

impl TryFrom<RawBody> for Body {
    type Error = ProtocolError;

    fn try_from(raw: RawBody) -> Result<Self, ProtocolError> {
        let populated = raw.populated();
        if populated != 1 {
            return Err(ProtocolError::Malformed { populated });
        }

        let RawBody {
            execute_tx_batch_request,
            execute_tx_batch_response,
            check_tx_batch_request,
            check_tx_batch_response,
            query_request,
            query_response,
            consensus_sync_request,
            consensus_sync_response,
            info_request,
            info_response,
            abort_request,
            abort_response,
            error,
            other,
        } = raw;

        // Exactly one of these matches.
        let body = execute_tx_batch_request
            .map(Body::ExecuteTxBatchRequest)
            .or_else(|| execute_tx_batch_response.map(Body::ExecuteTxBatchResponse))
            .or_else(|| check_tx_batch_request.map(Body::CheckTxBatchRequest))
            .or_else(|| check_tx_batch_response.map(Body::CheckTxBatchResponse))
            .or_else(|| query_request.map(Body::QueryRequest))
            .or_else(|| query_response.map(Body::QueryResponse))
            .or_else(|| consensus_sync_request.map(Body::ConsensusSyncRequest))
            .or_else(|| consensus_sync_response.map(Body::ConsensusSyncResponse))
            .or_else(|| info_request.map(Body::InfoRequest))
            .or_else(|| info_response.map(Body::InfoResponse))
            .or_else(|| abort_request.map(Body::AbortRequest))
            .or_else(|| abort_response.map(Body::AbortResponse))
            .or_else(|| error.map(Body::Error))
            .or_else(|| {
                other
                    .into_iter()
                    .find(|(_, v)| !v.is_null())
                    .map(|(method, payload)| Body::Other { method, payload })
            });

        body.ok_or(ProtocolError::Malformed { populated: 0 })
    }
}

impl From<Body> for RawBody {
    fn from(body: Body) -> Self {
        let mut raw = RawBody::default();
        match body {
            Body::ExecuteTxBatchRequest(b) => raw.execute_tx_batch_request = Some(b),
            Body::ExecuteTxBatchResponse(b) => raw.execute_tx_batch_response = Some(b),
            Body::CheckTxBatchRequest(b) => raw.check_tx_batch_request = Some(b),
            Body::CheckTxBatchResponse(b) => raw.check_tx_batch_response = Some(b),
            Body::QueryRequest(b) => raw.query_request = Some(b),
            Body::QueryResponse(b) => raw.query_response = Some(b),
            Body::ConsensusSyncRequest(b) => raw.consensus_sync_request = Some(b),
            Body::ConsensusSyncResponse(b) => raw.consensus_sync_response = Some(b),
            Body::InfoRequest(b) => raw.info_request = Some(b),
            Body::InfoResponse(b) => raw.info_response = Some(b),
            Body::AbortRequest(b) => raw.abort_request = Some(b),
            Body::AbortResponse(b) => raw.abort_response = Some(b),
            Body::Error(e) => raw.error = Some(e),
            Body::Other { method, payload } => {
                raw.other.insert(method, payload);
            }
        }
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MessageType {
    Request,
    Response,
}

/// One framed protocol message. Responses echo the id of their request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: u64,
    pub message_type: MessageType,
    pub body: RawBody,
}

impl Message {
    pub fn request(id: u64, body: Body) -> Self {
        Message { id, message_type: MessageType::Request, body: body.into() }
    }

    pub fn response(id: u64, result: Result<Body, HostError>) -> Self {
        let body = match result {
            Ok(body) => body,
            Err(err) => Body::Error(err.to_wire()),
        };
        Message { id, message_type: MessageType::Response, body: body.into() }
    }

    pub fn encode(&self) -> Result<Vec<u8>, HostError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, HostError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Validates the body and turns an `Error` body into `Err`.
    pub fn into_result(self) -> Result<Body, HostError> {
        match Body::try_from(self.body)? {
            Body::Error(err) => Err(HostError::from_wire(err)),
            body => Ok(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_request() -> Body {
        Body::ConsensusSyncRequest(ConsensusSyncRequest { height: 10 })
    }

    #[test]
    fn test_empty_raw_body_is_malformed() {
        assert_eq!(Body::try_from(RawBody::default()), Err(ProtocolError::Malformed { populated: 0 }));
    }

    #[test]
    fn test_two_variants_is_malformed() {
        let mut raw = RawBody::from(sync_request());
        raw.query_request = Some(QueryRequest {
            consensus_block: ConsensusBlock::default(),
            method: "x".into(),
            args: Vec::new(),
        });
        assert_eq!(Body::try_from(raw), Err(ProtocolError::Malformed { populated: 2 }));
    }

    #[test]
    fn test_wire_roundtrip() {
        let body = sync_request();
        let bytes = body.encode().unwrap();
        assert_eq!(Body::decode(&bytes).unwrap(), body);
    }

    #[test]
    fn test_json_shape_uses_wire_names() {
        let json: serde_json::Value = serde_json::from_slice(&sync_request().encode().unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key(METHOD_CONSENSUS_SYNC_REQUEST));
    }

    #[test]
    fn test_unknown_variant_decodes_as_other() {
        let body = Body::decode(br#"{"RuntimeFutureRequest":{"x":1}}"#).unwrap();
        assert_eq!(body.method(), "RuntimeFutureRequest");
        assert!(matches!(body, Body::Other { .. }));
    }

    #[test]
    fn test_null_does_not_count_as_populated() {
        let body = Body::decode(br#"{"RuntimeFutureRequest":null,"RuntimeConsensusSyncRequest":{"height":3}}"#).unwrap();
        assert_eq!(body, Body::ConsensusSyncRequest(ConsensusSyncRequest { height: 3 }));

        let err = Body::decode(br#"{"RuntimeQueryRequest":null}"#).unwrap_err();
        assert_eq!(err, HostError::Protocol(ProtocolError::Malformed { populated: 0 }));
    }

    #[test]
    fn test_garbage_is_codec_error() {
        assert!(matches!(Body::decode(b"not json"), Err(HostError::Codec(_))));
    }

    #[test]
    fn test_error_response_becomes_err() {
        let msg = Message::response(7, Err(HostError::NotReady));
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.message_type, MessageType::Response);
        assert_eq!(decoded.into_result(), Err(HostError::NotReady));
    }
}
