//! Ledger gateway: forwards identity and access-control contract calls to
//! the ledger-network client, when one is configured.

use std::sync::Arc;

use serde_json::json;

use crate::domain::PatientIdentity;
use crate::ports::{ContractCallResult, LedgerClient, LedgerError};

/// Gateway to the optional ledger client.
///
/// Without a client handle every call fails with
/// `LedgerError::ServiceUnavailable`; the rest of the process is unaffected.
#[derive(Clone)]
pub struct LedgerGateway {
    client: Option<Arc<dyn LedgerClient>>,
}

impl LedgerGateway {
    /// Gateway backed by a ledger client.
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Gateway with no client configured.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { client: None }
    }

    /// Whether a client handle is present.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    /// Execute a contract function and return its transaction id and result.
    ///
    /// # Errors
    /// Returns `ServiceUnavailable` when no client is configured, or the
    /// client's error when the call fails.
    pub fn execute_contract_function(
        &self,
        contract_id: &str,
        function_name: &str,
        params: &[serde_json::Value],
    ) -> Result<ContractCallResult, LedgerError> {
        let client = self.client.as_ref().ok_or_else(|| {
            LedgerError::ServiceUnavailable("ledger client not configured".to_string())
        })?;

        tracing::info!("Executing contract function {}::{}", contract_id, function_name);

        match client.execute(contract_id, function_name, params) {
            Ok(result) => {
                tracing::info!(
                    "Contract call {}::{} committed as {}",
                    contract_id,
                    function_name,
                    result.transaction_id
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("Contract call {}::{} failed: {}", contract_id, function_name, e);
                Err(e)
            }
        }
    }

    /// Record a patient identity on the ledger.
    ///
    /// Only the identifier and facility are sent; names and medical fields
    /// stay off-chain.
    ///
    /// # Errors
    /// See `execute_contract_function`.
    pub fn register_patient(
        &self,
        contract_id: &str,
        identity: &PatientIdentity,
    ) -> Result<ContractCallResult, LedgerError> {
        self.execute_contract_function(
            contract_id,
            "registerPatient",
            &[json!(identity.patient_id), json!(identity.hopital)],
        )
    }

    /// Grant a practitioner access to a patient's records.
    ///
    /// # Errors
    /// See `execute_contract_function`.
    pub fn grant_access(
        &self,
        contract_id: &str,
        patient_id: &str,
        medecin_id: &str,
    ) -> Result<ContractCallResult, LedgerError> {
        self.execute_contract_function(
            contract_id,
            "grantAccess",
            &[json!(patient_id), json!(medecin_id)],
        )
    }

    /// Revoke a practitioner's access.
    ///
    /// # Errors
    /// See `execute_contract_function`.
    pub fn revoke_access(
        &self,
        contract_id: &str,
        patient_id: &str,
        medecin_id: &str,
    ) -> Result<ContractCallResult, LedgerError> {
        self.execute_contract_function(
            contract_id,
            "revokeAccess",
            &[json!(patient_id), json!(medecin_id)],
        )
    }
}

impl std::fmt::Debug for LedgerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerGateway")
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Client that records calls and answers with a sequential transaction id.
    #[derive(Default)]
    struct StubLedger {
        calls: Mutex<Vec<(String, String, Vec<serde_json::Value>)>>,
    }

    impl LedgerClient for StubLedger {
        fn execute(
            &self,
            contract_id: &str,
            function_name: &str,
            params: &[serde_json::Value],
        ) -> Result<ContractCallResult, LedgerError> {
            if function_name == "explode" {
                return Err(LedgerError::Client("CONTRACT_REVERT_EXECUTED".to_string()));
            }
            let mut calls = self.calls.lock().expect("Lock failed");
            calls.push((contract_id.to_string(), function_name.to_string(), params.to_vec()));
            Ok(ContractCallResult {
                transaction_id: format!("0.0.1234@{}", calls.len()),
                result: json!(true),
            })
        }
    }

    #[test]
    fn test_missing_client_is_unavailable() {
        let gateway = LedgerGateway::unavailable();
        assert!(!gateway.is_available());

        let result = gateway.execute_contract_function("0.0.5005", "getPatient", &[]);
        assert!(matches!(result, Err(LedgerError::ServiceUnavailable(_))));
    }

    #[test]
    fn test_register_patient_forwards_call() {
        let stub = Arc::new(StubLedger::default());
        let gateway = LedgerGateway::new(stub.clone());

        let identity = PatientIdentity::new("BJ20250001", "KOSSOU", "Adjoa", "chu-mel");
        let result = gateway.register_patient("0.0.5005", &identity).expect("Should call");
        assert_eq!(result.transaction_id, "0.0.1234@1");

        let calls = stub.calls.lock().expect("Lock failed");
        assert_eq!(calls[0].0, "0.0.5005");
        assert_eq!(calls[0].1, "registerPatient");
        assert_eq!(calls[0].2, vec![json!("BJ20250001"), json!("chu-mel")]);
    }

    #[test]
    fn test_access_control_calls() {
        let stub = Arc::new(StubLedger::default());
        let gateway = LedgerGateway::new(stub.clone());

        gateway.grant_access("0.0.5005", "BJ20250001", "MED-042").expect("Should grant");
        gateway.revoke_access("0.0.5005", "BJ20250001", "MED-042").expect("Should revoke");

        let calls = stub.calls.lock().expect("Lock failed");
        let names: Vec<&str> = calls.iter().map(|c| c.1.as_str()).collect();
        assert_eq!(names, vec!["grantAccess", "revokeAccess"]);
    }

    #[test]
    fn test_client_error_propagates() {
        let gateway = LedgerGateway::new(Arc::new(StubLedger::default()));
        let result = gateway.execute_contract_function("0.0.5005", "explode", &[]);
        assert!(matches!(result, Err(LedgerError::Client(_))));
    }
}
