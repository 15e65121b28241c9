pub mod dispatcher;
pub mod inverter;
