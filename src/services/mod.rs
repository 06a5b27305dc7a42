pub mod jwt;
pub mod password;
pub mod storage;

pub use jwt::JwtService;
pub use password::PasswordService;
pub use storage::{ImageStorage, LocalImageStorage, SharedStorage};
