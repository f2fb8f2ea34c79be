pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod router;
pub mod services;

pub use error::*;
pub use handlers::JobsHandlers;
pub use jobs::*;
pub use models::*;
pub use router::create_jobs_router;
pub use services::*;
