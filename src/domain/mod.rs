//! Domain module
//!
//! Request-scoped types shared by the handlers and the gateways.

pub mod contact;

pub use contact::ContactSubmission;
