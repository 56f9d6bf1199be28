pub mod entry;
pub mod histogram;
pub mod key;
pub mod registry;

pub use entry::{EntryStats, EntrySummary};
pub use histogram::LatencySummary;
pub use key::{Category, EntryKey};
pub use registry::StatsRegistry;
