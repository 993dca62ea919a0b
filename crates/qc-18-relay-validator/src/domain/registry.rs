//! # Request Registry
//!
//! In-memory table of in-flight validation requests and their signature maps.
//!
//! All state lives behind one coarse `RwLock`. Every signature write checks
//! existence and deadline under the write lock, so a request removed by the
//! expiry sweep (or retired by submission) can never be recreated by a late
//! signing task or a late share.
//!
//! Retired request IDs are remembered as tombstones until their deadline
//! passes, so a replayed message cannot restart a submitted request.

use crate::domain::request::{
    RequestId, RequestState, RequestStatus, SignatureShare, ValidationRequest,
};
use crate::domain::validator::ValidatorSet;
use crate::error::ValidatorError;
use parking_lot::RwLock;
use shared_crypto::{Address, RecoverableSignature};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of recording a signature share.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// First share from this signer.
    Recorded {
        /// Distinct signatures after the write
        count: usize,
        /// Signatures required
        required: usize,
    },
    /// Replaced an earlier share from the same signer.
    Replaced {
        /// Distinct signatures after the write
        count: usize,
        /// Signatures required
        required: usize,
    },
}

impl SignatureOutcome {
    /// Distinct signatures after the write.
    pub fn count(&self) -> usize {
        match self {
            SignatureOutcome::Recorded { count, .. } | SignatureOutcome::Replaced { count, .. } => {
                *count
            }
        }
    }

    /// Whether the request has enough distinct signatures.
    pub fn threshold_reached(&self) -> bool {
        match self {
            SignatureOutcome::Recorded { count, required }
            | SignatureOutcome::Replaced { count, required } => count >= required,
        }
    }
}

struct TrackedRequest {
    request: ValidationRequest,
    signatures: HashMap<Address, RecoverableSignature>,
    eligible: Arc<ValidatorSet>,
    submitting: bool,
}

impl TrackedRequest {
    fn status(&self, now: u64) -> RequestStatus {
        RequestStatus {
            request_id: self.request.request_id,
            payment_id: self.request.payment_id.clone(),
            state: self.request.state_at(self.signatures.len(), now),
            signature_count: self.signatures.len(),
            required_signatures: self.request.required_signatures,
            deadline: self.request.deadline,
            high_value: self.request.high_value,
        }
    }

    fn shares(&self) -> Vec<SignatureShare> {
        let mut shares: Vec<SignatureShare> = self
            .signatures
            .iter()
            .map(|(signer, signature)| SignatureShare {
                request_id: self.request.request_id,
                signer: *signer,
                signature: *signature,
            })
            .collect();
        shares.sort_by(|a, b| a.signer.cmp(&b.signer));
        shares
    }
}

#[derive(Default)]
struct RegistryState {
    requests: HashMap<RequestId, TrackedRequest>,
    /// Retired request ID -> deadline
    retired: HashMap<RequestId, u64>,
}

/// Registry of tracked validation requests.
pub struct RequestRegistry {
    state: RwLock<RegistryState>,
    capacity: usize,
}

impl RequestRegistry {
    /// Create a registry holding at most `capacity` requests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            capacity,
        }
    }

    /// Track a new request.
    ///
    /// `eligible` is the validator set snapshotted for this request; only its
    /// members may contribute signatures.
    pub fn create(
        &self,
        request: ValidationRequest,
        eligible: Arc<ValidatorSet>,
        now: u64,
    ) -> Result<(), ValidatorError> {
        let request_id = request.request_id;
        let mut state = self.state.write();

        if state.requests.contains_key(&request_id) || state.retired.contains_key(&request_id) {
            return Err(ValidatorError::DuplicateRequest { request_id });
        }
        if request.is_expired(now) {
            return Err(ValidatorError::RequestExpired {
                request_id,
                deadline: request.deadline,
            });
        }
        if state.requests.len() >= self.capacity {
            return Err(ValidatorError::TooManyPendingRequests {
                limit: self.capacity,
            });
        }

        state.requests.insert(
            request_id,
            TrackedRequest {
                request,
                signatures: HashMap::new(),
                eligible,
                submitting: false,
            },
        );
        Ok(())
    }

    /// Record a share. A later share from the same signer replaces the earlier one.
    ///
    /// The caller is responsible for verifying the signature itself.
    pub fn add_signature(
        &self,
        share: &SignatureShare,
        now: u64,
    ) -> Result<SignatureOutcome, ValidatorError> {
        let request_id = share.request_id;
        let mut state = self.state.write();
        let tracked = state
            .requests
            .get_mut(&request_id)
            .ok_or(ValidatorError::RequestNotFound { request_id })?;

        if tracked.request.is_expired(now) {
            return Err(ValidatorError::RequestExpired {
                request_id,
                deadline: tracked.request.deadline,
            });
        }
        if !tracked.eligible.contains(&share.signer) {
            return Err(ValidatorError::UnknownSigner {
                request_id,
                signer: hex::encode(share.signer),
            });
        }

        let replaced = tracked
            .signatures
            .insert(share.signer, share.signature)
            .is_some();
        let count = tracked.signatures.len();
        let required = tracked.request.required_signatures;

        Ok(if replaced {
            SignatureOutcome::Replaced { count, required }
        } else {
            SignatureOutcome::Recorded { count, required }
        })
    }

    /// Status of a tracked request.
    pub fn status(&self, request_id: RequestId, now: u64) -> Option<RequestStatus> {
        self.state
            .read()
            .requests
            .get(&request_id)
            .map(|tracked| tracked.status(now))
    }

    /// Collected shares ordered by signer address.
    pub fn signatures(&self, request_id: RequestId) -> Option<Vec<SignatureShare>> {
        self.state
            .read()
            .requests
            .get(&request_id)
            .map(TrackedRequest::shares)
    }

    /// Hex message hash of a tracked request.
    pub fn message_hash(&self, request_id: RequestId) -> Option<String> {
        self.state
            .read()
            .requests
            .get(&request_id)
            .map(|tracked| tracked.request.message_hash.clone())
    }

    /// Number of tracked requests.
    pub fn len(&self) -> usize {
        self.state.read().requests.len()
    }

    /// Whether no request is tracked.
    pub fn is_empty(&self) -> bool {
        self.state.read().requests.is_empty()
    }

    /// Whether `request_id` is tracked.
    pub fn contains(&self, request_id: RequestId) -> bool {
        self.state.read().requests.contains_key(&request_id)
    }

    /// Threshold-reached, unexpired requests not already being submitted.
    pub fn ready_for_submission(&self, now: u64) -> Vec<RequestId> {
        let state = self.state.read();
        let mut ready: Vec<RequestId> = state
            .requests
            .values()
            .filter(|tracked| {
                !tracked.submitting
                    && tracked.request.state_at(tracked.signatures.len(), now)
                        == RequestState::ThresholdReached
            })
            .map(|tracked| tracked.request.request_id)
            .collect();
        ready.sort_unstable();
        ready
    }

    /// Mark a request as being submitted and return its status and shares.
    ///
    /// Must be paired with [`retire`](Self::retire) on success or
    /// [`release_submission`](Self::release_submission) on failure.
    pub fn claim_for_submission(
        &self,
        request_id: RequestId,
        now: u64,
    ) -> Result<(RequestStatus, Vec<SignatureShare>), ValidatorError> {
        let mut state = self.state.write();
        let tracked = state
            .requests
            .get_mut(&request_id)
            .ok_or(ValidatorError::RequestNotFound { request_id })?;

        if tracked.submitting {
            return Err(ValidatorError::SubmissionInProgress { request_id });
        }
        match tracked.request.state_at(tracked.signatures.len(), now) {
            RequestState::Expired => {
                return Err(ValidatorError::RequestExpired {
                    request_id,
                    deadline: tracked.request.deadline,
                })
            }
            RequestState::Pending => {
                return Err(ValidatorError::ThresholdNotReached {
                    have: tracked.signatures.len(),
                    need: tracked.request.required_signatures,
                })
            }
            RequestState::ThresholdReached | RequestState::Submitted => {}
        }

        tracked.submitting = true;
        Ok((tracked.status(now), tracked.shares()))
    }

    /// Clear the in-flight submission mark after a failed submission.
    pub fn release_submission(&self, request_id: RequestId) {
        if let Some(tracked) = self.state.write().requests.get_mut(&request_id) {
            tracked.submitting = false;
        }
    }

    /// Remove a successfully submitted request, leaving a tombstone until its deadline.
    pub fn retire(&self, request_id: RequestId) -> Option<RequestStatus> {
        let mut state = self.state.write();
        let tracked = state.requests.remove(&request_id)?;
        state.retired.insert(request_id, tracked.request.deadline);

        let mut status = tracked.status(0);
        status.state = RequestState::Submitted;
        Some(status)
    }

    /// Remove every request whose deadline has passed, plus stale tombstones.
    ///
    /// Returns the IDs of the removed requests.
    pub fn prune_expired(&self, now: u64) -> Vec<RequestId> {
        let mut state = self.state.write();

        let expired: Vec<RequestId> = state
            .requests
            .values()
            .filter(|tracked| tracked.request.is_expired(now))
            .map(|tracked| tracked.request.request_id)
            .collect();
        for request_id in &expired {
            state.requests.remove(request_id);
        }
        state.retired.retain(|_, deadline| *deadline > now);

        expired
    }

    /// Number of retired IDs still remembered.
    pub fn retired_len(&self) -> usize {
        self.state.read().retired.len()
    }
}
