pub mod emotion;
pub mod project;
pub mod report;
pub mod user;

pub use emotion::EmotionSample;
pub use project::Project;
pub use report::{MoodReport, ReportKind};
pub use user::User;
