pub mod changed_packages;
pub mod gaps;
pub mod history;
pub mod links;
mod monitor;
pub mod specs;
pub mod window;

pub use monitor::Monitor;
