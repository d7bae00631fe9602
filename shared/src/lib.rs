pub mod protocol;
pub mod math;
pub mod task;
pub mod weapons;

pub use protocol::*;
pub use math::*;
pub use task::*;
pub use weapons::*;
