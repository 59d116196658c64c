pub mod audit;
pub mod file;
pub mod user;

pub use audit::*;
pub use file::*;
pub use user::*;
