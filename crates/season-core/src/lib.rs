//! Core metadata types shared across the season-archive workspace.
//!
//! Everything here is pure: time axes and their offset arithmetic, the
//! axis-order view tags, and the packing descriptors that declare how a
//! dataset's semantic values map onto its stored representation. No I/O.

pub mod packing;
pub mod time;
pub mod view;

pub use packing::{Packing, SemanticType, StorageType};
pub use time::{Period, TimeAxis, TimeAxisError, TimeKey};
pub use view::View;
