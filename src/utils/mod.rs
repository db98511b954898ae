pub mod candle;
pub mod env;
pub mod feature_config;
pub mod progress;
