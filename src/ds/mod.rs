pub mod arena;

pub use arena::{SlotArena, SlotId};
