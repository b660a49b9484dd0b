pub mod airports;
pub mod files;
