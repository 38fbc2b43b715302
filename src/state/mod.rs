pub mod capture_store;
pub mod listing_store;

pub use capture_store::MemoryCaptureStore;
pub use listing_store::MemoryListingStore;
