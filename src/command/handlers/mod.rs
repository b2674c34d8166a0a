//! Default command handlers
//!
//! Everything here is a thin adapter between a parameter map and the
//! [`DeviceBackend`] collaborator: validate inputs, call the backend, shape
//! the result map. No handler touches hardware or storage directly.

mod bus;
mod files;
mod gpio;
mod system;
mod wifi;

use std::sync::Arc;

use crate::engine::EngineStats;
use crate::error::EngineError;
use crate::hal::{BackendError, DeviceBackend};

use super::registry::{HandlerRegistry, RegistryBuilder};

/// Collaborator failures surface as handler errors with the original message
fn backend_err(e: BackendError) -> EngineError {
    EngineError::Handler(e.to_string())
}

/// Register a set of `async fn(&dyn DeviceBackend, &JsonMap)` handlers
macro_rules! register_backend {
    ($builder:expr, $backend:expr, { $( $name:literal => $func:path ),+ $(,)? }) => {{
        let mut builder: RegistryBuilder = $builder;
        $(
            let backend = Arc::clone(&$backend);
            builder = builder.register_fn($name, move |params| {
                let backend = Arc::clone(&backend);
                async move { $func(backend.as_ref(), &params).await }
            });
        )+
        builder
    }};
}

/// Build the full default handler set over one backend
pub fn default_registry(
    backend: Arc<dyn DeviceBackend>,
    stats: Arc<EngineStats>,
) -> HandlerRegistry {
    let mut builder = HandlerRegistry::builder();

    let s = Arc::clone(&stats);
    builder = builder.register_fn("ping", move |_params| {
        let s = Arc::clone(&s);
        async move { system::ping(&s) }
    });

    let b = Arc::clone(&backend);
    builder = builder.register_fn("version", move |_params| {
        let b = Arc::clone(&b);
        async move { system::version(b.as_ref()) }
    });

    let b = Arc::clone(&backend);
    let s = Arc::clone(&stats);
    builder = builder.register_fn("system_info", move |_params| {
        let b = Arc::clone(&b);
        let s = Arc::clone(&s);
        async move { system::system_info(b.as_ref(), &s) }
    });

    builder = register_backend!(builder, backend, {
        "gpio_read" => gpio::read,
        "gpio_write" => gpio::write,
        "adc_read" => gpio::adc_read,
        "i2c_scan" => bus::i2c_scan,
        "i2c_read" => bus::i2c_read,
        "i2c_write" => bus::i2c_write,
        "spi_transfer" => bus::spi_transfer,
        "file_list" => files::list,
        "file_read" => files::read,
        "file_write" => files::write,
        "file_delete" => files::delete,
        "file_mkdir" => files::mkdir,
        "wifi_scan" => wifi::scan,
        "wifi_connect" => wifi::connect,
    });

    builder.build()
}
