pub mod assistant;
pub mod error;
pub mod report;
pub mod server;

pub use assistant::configuration::{Configuration, ResearchSettings};
pub use assistant::pipeline::ReportPipeline;
pub use assistant::state::{ReportInput, StatusUpdate};
pub use error::ReportError;
pub use report::Report;

use dotenv::dotenv;

/// Load `.env` into the process environment.
pub fn init() {
    dotenv().ok();
}
