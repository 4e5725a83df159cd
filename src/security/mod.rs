//! Access control for filer requests

pub mod guard;
pub mod jwt;
pub mod middleware;

pub use guard::{Guard, GuardSet, OperationKind};
pub use jwt::{verify_token, EncodedJwt, TokenIssuer, TOKEN_TTL_SECS};
pub use middleware::{extract_token, guard_middleware};
