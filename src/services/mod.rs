pub mod attribute_service;
pub mod display;
pub mod fixtures;
pub mod user_service;
