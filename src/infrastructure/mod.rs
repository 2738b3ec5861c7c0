pub mod scheduler;

pub use scheduler::{
    ExitFuture, JobHandle, LaunchRequest, ResourceRequest, Scheduler, SlurmScheduler,
};
