pub mod audit;
pub mod auth;
pub mod rate_limit;
pub mod registry;
pub mod sweep;

pub use audit::{AuditSink, SqliteAuditSink};
pub use auth::AuthService;
pub use rate_limit::{RateLimiter, RatePolicy};
pub use registry::{validate_file_id, FileRegistry, SweepOutcome};
