pub mod api;
pub mod config;
pub mod session;

pub mod prelude {
    pub use super::api::ApiError;
    pub use super::config::ConfigError;
    pub use super::session::SessionError;
}
