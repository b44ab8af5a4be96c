pub mod http_client;
pub mod retry;
pub mod text;
pub mod notifier;
