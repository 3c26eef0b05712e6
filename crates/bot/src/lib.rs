pub mod bot;
pub mod summary;
