pub mod logging;
pub mod metrics;

pub use logging::{
    amount_band, init_logging, mask_account, mask_reference, mask_wallet_id, LogConfig, LogFormat,
};
pub use metrics::{get_metrics, init_metrics, LatencyTimer, Metrics, METRICS};
