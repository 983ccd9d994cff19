pub mod capture;
pub mod request_id;

pub use capture::*;
pub use request_id::*;
