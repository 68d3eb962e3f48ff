pub mod backends;

pub use backends::memory::MemoryBackend;

pub mod prelude {
    pub use super::backends::memory::MemoryBackend;
    pub use nd_core::{EntryStore, SummaryStore, UsageStore, UserStore};
}
