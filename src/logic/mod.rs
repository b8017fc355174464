pub mod search;
pub mod timesheet_rules;
pub mod validate;

pub use search::*;
pub use timesheet_rules::*;
pub use validate::*;
