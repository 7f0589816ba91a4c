pub mod client;

pub use client::DispatchClient;
