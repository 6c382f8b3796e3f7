pub mod clock;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod notifiers;
pub mod scheduler;
pub mod store;
pub mod utils;
pub mod watch_manager;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use extractor::{Extraction, PriceExtractor};
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use models::{FailureKind, NewWatch, Watch, WatchKey};
pub use notifiers::AlertDispatcher;
pub use scheduler::{CyclePhase, CycleReport, OneOffCheck, RecheckScheduler, SchedulerStats};
pub use store::WatchStore;
pub use utils::error::{AppError, DispatchError, FetchError, Result};
pub use watch_manager::{WatchCheckResult, WatchManager};
