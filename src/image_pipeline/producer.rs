//! Pixel producer module
//!
//! Upstream stages that materialize regions on request.

mod memory;
mod monitor;
mod reader;

pub use memory::InMemoryProducer;
pub use monitor::MonitoredProducer;
pub use reader::PixelProducer;
