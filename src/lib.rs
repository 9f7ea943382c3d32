#![doc = include_str!("../README.md")]

pub mod balance_compensator;
pub mod calibration;
pub mod error;
pub mod gait;
pub mod gait_generator;
pub mod hexapod;
pub mod joint;
pub mod leg;
pub mod logging;
pub mod scuttle_config;
pub mod servo_controller;
pub mod utilities;
