pub mod jobs;
pub mod notifications;
pub mod proposals;
pub mod reviews;
pub mod users;
