pub mod ask;
pub mod invoke;
pub mod memory;
pub mod run;
mod utils;
