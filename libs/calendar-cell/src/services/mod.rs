pub mod google;
pub mod provider;
