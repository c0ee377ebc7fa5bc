pub mod admin_handlers;
pub mod attribute_handlers;
pub mod extract;
pub mod health_handlers;
