//! `clipforge-auth` — bearer-token authentication boundary.
//!
//! Claims validation is pure and transport-agnostic; HS256 decoding lives in
//! the validator module and is the only place that touches token wire format.

pub mod claims;
pub mod validator;

pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use validator::{Hs256JwtValidator, JwtValidator};
