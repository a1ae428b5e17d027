//! Level unit conversion

pub mod convert;

pub use convert::{db_to_linear, db_to_meter_position, linear_to_db, meter_position_to_db, LevelConverter};
