pub mod ports;
pub mod aggregate_use_case;
