//! Chess grids of a complex.
//!
//! - `editor`: admin view over the spreadsheet grid, batch status edits
//! - `board`: sales shaxmatka, blocks and floors, opening a unit for pricing

pub mod board;
pub mod editor;

pub use board::{BoardUnit, ChessBoard};
pub use editor::{GridColumns, GridEditor, GridRow};
