pub mod display;
pub mod logger;
pub mod midi;
pub mod monitor;
