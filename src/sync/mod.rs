pub mod maintenance;
pub mod scheduler;
pub mod service;

pub use maintenance::{Maintenance, MaintenanceReport};
pub use scheduler::Scheduler;
pub use service::{SyncBatch, SyncReport, SyncService};
