//!  Storage is organized through [snapshot::JsonSnapshotStorage].
//!  The basic idea is:
//!   - The whole [entities::ActivityStore] is small, so it is kept in memory and written out in
//!     full after every change.
//!   - Writes go to a temporary file that replaces the snapshot only once it is durable.
//!   - A snapshot that can't be parsed is set aside and tracking starts over.

pub mod entities;
pub mod snapshot;
