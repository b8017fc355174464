pub mod catalog_handlers;
pub mod client_handlers;
pub mod handlers;
pub mod project_handlers;
pub mod proposal_handlers;
pub mod routes;
pub mod timesheet_handlers;
pub mod user_extractor;
pub mod user_handlers;

pub use handlers::*;
pub use routes::*;
