pub mod config;
pub mod executor;
pub mod install;
pub mod megatools;
pub mod process;
pub mod progress;

#[cfg(all(test, unix))]
mod testing;

pub use config::{MegatoolsConfig, DEFAULT_DOWNLOAD_URL};
pub use executor::LineExecutor;
pub use install::{executable_file_name, locate};
pub use megatools::{Fetch, FetchRequest, Megatools, PendingFetch};
pub use process::{ProcessConfig, ProcessControl};
pub use progress::{AsyncProgress, EchoProgress, LineEvent, Progress, StopOnFirstLine, SyncProgress};
