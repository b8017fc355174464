pub mod assignment;
pub mod catalog;
pub mod client;
pub mod common;
pub mod filter;
pub mod project;
pub mod proposal;
pub mod timesheet;
pub mod user;
pub mod user_context;

pub use assignment::*;
pub use catalog::*;
pub use client::*;
pub use common::*;
pub use filter::*;
pub use project::*;
pub use proposal::*;
pub use timesheet::*;
pub use user::*;
pub use user_context::*;
