pub mod backend;
pub mod config;
pub mod constants;
pub mod message;
pub mod relay;
pub mod session;
#[cfg(test)]
pub mod test_support;
