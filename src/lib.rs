pub mod api_router;
pub mod core;
pub mod crm;
pub mod engage;
pub mod main_module;
pub mod store;
pub mod tests;
