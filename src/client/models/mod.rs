pub mod api_types;
pub mod app_state;
pub mod messages;
pub mod ui_state;
