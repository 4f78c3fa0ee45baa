//! Ledger port: call/response contract to the ledger-network client.
//!
//! The ledger network owns its own consistency guarantees; this crate only
//! forwards contract calls and reports the transaction id.

use serde::{Deserialize, Serialize};

/// Error type for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Contract call failed: {0}")]
    Client(String),
}

/// Result of a contract function execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCallResult {
    pub transaction_id: String,
    pub result: serde_json::Value,
}

/// Trait for the external ledger client handle.
pub trait LedgerClient: Send + Sync {
    /// Execute a smart-contract function.
    ///
    /// # Errors
    /// Returns `LedgerError::Client` if the network rejects the call.
    fn execute(
        &self,
        contract_id: &str,
        function_name: &str,
        params: &[serde_json::Value],
    ) -> Result<ContractCallResult, LedgerError>;
}
