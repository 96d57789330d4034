pub mod create;
pub mod decrypt;
pub mod list;
pub mod path;
