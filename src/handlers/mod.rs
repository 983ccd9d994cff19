pub mod health;
pub mod logs;

pub use health::*;
pub use logs::*;
