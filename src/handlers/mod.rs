mod health;
mod metrics;
mod resources;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use resources::{collection_handler, item_handler};
