pub mod serial;
pub mod tcp;
pub mod traits;

pub use serial::SerialSource;
pub use tcp::TcpSource;
pub use traits::{TransportSource, TransportStream};
