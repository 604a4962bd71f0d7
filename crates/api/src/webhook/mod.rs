mod handler;
mod payload;
mod signature;

pub use handler::webhook_handler;
