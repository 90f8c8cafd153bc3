pub mod api;
pub mod error;
pub mod http;
pub mod pages;

#[cfg(test)]
pub(crate) mod testing;
