pub mod analytics;
pub mod page;
pub mod view;

pub use page::DashboardTemplate;
pub use view::{DashboardPage, Notice, ViewParams, ViewSettings};
