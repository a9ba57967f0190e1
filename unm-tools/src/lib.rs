pub mod ref_flag;
pub mod slot_pool;

pub use ref_flag::{Edge, RefFlag, Underflow};
pub use slot_pool::SlotPool;
