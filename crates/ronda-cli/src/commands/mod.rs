pub mod audit;
pub mod common;
pub mod pending;
pub mod run;
pub mod save;
pub mod status;
pub mod sync;
