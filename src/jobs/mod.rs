pub mod progress;
pub mod results;
pub mod scheduler;

pub use progress::{CancelFlag, ProgressSink, ProgressTracker};
pub use results::JobResultRegistry;
pub use scheduler::{JobContext, JobScheduler};
