pub mod fps_limiter;
pub mod time_manager;
pub mod platform_specific;

pub use fps_limiter::*;
pub use time_manager::*;
