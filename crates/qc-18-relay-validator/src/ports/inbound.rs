//! # Inbound Ports
//!
//! API trait defining what the relay validator node can do.

use crate::domain::{
    RequestId, RequestStatus, SignatureOutcome, SignatureShare, ValidationMessage, Validator,
};
use crate::error::ValidatorError;
use crate::service::SubmissionReceipt;
use async_trait::async_trait;

/// Relay validator API - inbound port.
#[async_trait]
pub trait ValidatorApi: Send + Sync {
    /// Register this node as a validator with `stake`.
    async fn register_validator(&self, stake: u128) -> Result<(), ValidatorError>;

    /// Track a new validation request and schedule signing.
    fn process_validation_request(&self, message: ValidationMessage)
        -> Result<(), ValidatorError>;

    /// Verify and record another validator's signature share.
    fn process_signature_share(
        &self,
        share: SignatureShare,
    ) -> Result<SignatureOutcome, ValidatorError>;

    /// Submit a threshold-reached request to the validator contract.
    async fn submit_validation(
        &self,
        request_id: RequestId,
    ) -> Result<SubmissionReceipt, ValidatorError>;

    /// Status of a tracked request.
    fn get_validation_status(&self, request_id: RequestId) -> Option<RequestStatus>;

    /// Collected signature shares of a tracked request.
    fn get_signatures(&self, request_id: RequestId) -> Option<Vec<SignatureShare>>;

    /// Number of tracked requests.
    fn get_pending_validation_count(&self) -> usize;

    /// Snapshot of this node's validator record.
    fn validator(&self) -> Validator;
}
