pub mod daily;
pub mod provider;
