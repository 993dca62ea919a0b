//! # Domain Module
//!
//! Core domain types for the relay validator: validator identity, validation
//! requests with their signature shares, and the in-memory request registry.

pub mod registry;
pub mod request;
pub mod validator;

pub use registry::{RequestRegistry, SignatureOutcome};
pub use request::{
    required_signatures, RequestId, RequestState, RequestStatus, SignatureShare,
    ValidationMessage, ValidationRequest,
};
pub use validator::{Validator, ValidatorSet, ValidatorStatus};
