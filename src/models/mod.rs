//! Records produced by a sync cycle.
//!
//! Everything here is derived per sync and lives only as long as the cache entry.

pub mod booking;
pub mod payload;
pub mod room;
pub mod settings;

pub use self::booking::*;
pub use self::payload::*;
pub use self::room::*;
pub use self::settings::*;
