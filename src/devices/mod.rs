pub mod service;
pub mod topics;
pub mod types;

pub use service::DevicesService;
