mod client;
mod env;

pub use client::ModuleClient;
pub use env::EnvVars;
