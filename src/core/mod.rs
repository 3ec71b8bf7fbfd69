pub mod catalog;
pub mod fatal;
pub mod importer;
pub mod mapper;
pub mod queue;
