//! Page layer: cell record layout and the slotted page built from it.

pub mod cell;
mod slotted;

pub(crate) use slotted::CellWrite;
pub use slotted::{Page, CELL_CAPACITY, SLOT_CAPACITY};
