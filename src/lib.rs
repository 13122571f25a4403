pub mod build;
pub mod manifest;
pub mod plugin;
pub mod process;
pub mod run;
pub mod scheduler;
pub mod signal;
pub mod solution;
pub mod task;
pub mod terminal;

#[cfg(not(windows))]
use jemallocator::Jemalloc;

#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
