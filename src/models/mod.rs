pub mod request;
pub mod result;
pub mod violation;

pub use request::{ExecutionRequest, SanitizedPayload};
pub use result::{ExecutionOutcome, ExecutionResult};
pub use violation::{SecurityLevel, SecurityViolation, ThreatKind};
