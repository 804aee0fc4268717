//! Spatial data structures over the basis-function centers.
//!
//! [`SpatialTree`] is a binary midpoint-split tree over the shells; [`SquareTree`] pairs
//! its nodes to cover the blocks of a basis x basis matrix.
mod bound;
pub mod spatial;
pub mod square;

pub use bound::BoundingBox;
pub use spatial::{NodeId, SpatialNode, SpatialStat, SpatialTree};
pub use square::{Ledger, LedgerKind, SquareId, SquareNode, SquareTree};
