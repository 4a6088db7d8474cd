//! Gauss-Newton registration engine.

pub mod operators;
pub mod session;

pub use operators::{accumulate, diagnostic_fields, DiagnosticFields, Operators};
pub use session::{
    registration_loop, RegistrationResult, RegistrationSession, RegistrationStatus, SessionState,
};
