//! Admission checks for individual transactions.
//!
//! Evaluation is per input: no state is carried from one input to the next, and nothing
//! here touches a batch tree. A rejection is a normal outcome encoded in the result.

use crate::protocol::WireError;

/// Input that the sentinel policy always rejects.
pub const CHECKTX_FAIL_INPUT: &[u8] = b"checktx-mock-fail";

/// Module reported for sentinel rejections.
pub const SENTINEL_MODULE: &str = "mock";
/// Module reported for size-limit rejections.
pub const CHECKTX_MODULE: &str = "checktx";

/// Error code meaning "accepted".
pub const CODE_NO_ERROR: u32 = 0;

/// Verdict for one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CheckTxResult {
    pub error: WireError,
}

impl CheckTxResult {
    pub fn accepted() -> Self {
        Self::default()
    }

    pub fn rejected(module: &str, code: u32, message: impl Into<String>) -> Self {
        CheckTxResult {
            error: WireError { module: module.to_string(), code, message: message.into() },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.code == CODE_NO_ERROR
    }
}

/// Decides admission for a single raw transaction.
pub trait CheckTxPolicy: Send + Sync {
    fn check(&self, input: &[u8]) -> CheckTxResult;
}

/// Evaluates `inputs` in order, one result per input.
pub fn evaluate_batch<P: CheckTxPolicy + ?Sized>(policy: &P, inputs: &[Vec<u8>]) -> Vec<CheckTxResult> {
    let results: Vec<CheckTxResult> = inputs.iter().map(|input| policy.check(input)).collect();
    let rejected = results.iter().filter(|r| !r.is_success()).count();
    tracing::debug!(txs = inputs.len(), rejected, "checked transaction batch");
    results
}

/// Accepts everything except the sentinel input and, optionally, oversized inputs.
#[derive(Debug, Clone, Default)]
pub struct SentinelPolicy {
    max_tx_size: Option<usize>,
}

impl SentinelPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tx_size(max_tx_size: Option<usize>) -> Self {
        SentinelPolicy { max_tx_size }
    }
}

impl CheckTxPolicy for SentinelPolicy {
    fn check(&self, input: &[u8]) -> CheckTxResult {
        if input == CHECKTX_FAIL_INPUT {
            return CheckTxResult::rejected(SENTINEL_MODULE, 1, "");
        }
        match self.max_tx_size {
            Some(limit) if input.len() > limit => CheckTxResult::rejected(
                CHECKTX_MODULE,
                2,
                format!("transaction too large: {} > {}", input.len(), limit),
            ),
            _ => CheckTxResult::accepted(),
        }
    }
}
