pub mod insertion_map;
pub mod slot_arena;

pub use insertion_map::InsertionMap;
pub use slot_arena::{SlotArena, SlotId};
