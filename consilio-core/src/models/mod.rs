pub mod agent;
pub mod meeting;
pub mod page;
pub mod session;

pub use agent::Agent;
pub use meeting::{Meeting, MeetingStatus};
pub use page::Page;
pub use session::{Session, SessionRecord, SessionUser};
