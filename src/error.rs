use std::result::Result;
use thiserror::Error;

use crate::joint::JointName;

pub type ScuttleResult<T> = Result<T, ScuttleError>;

#[derive(Error, Debug)]
pub enum ScuttleError {
    #[error("leg {leg_index}: target out of reach ({distance:.2} mm exceeds {max_reach:.2} mm)")]
    OutOfReach {
        leg_index: usize,
        distance: f32,
        max_reach: f32,
    },

    #[error(
        "leg {leg_index} {joint} angle {angle:.2}° outside hard limits ({min:.2}° to {max:.2}°)"
    )]
    AngleOutOfHardLimit {
        leg_index: usize,
        joint: JointName,
        angle: f32,
        min: f32,
        max: f32,
    },

    #[error("leg {leg_index} {joint} angle {angle:.2}° outside calibrated limit {limit:.2}°")]
    AngleOutOfSoftLimit {
        leg_index: usize,
        joint: JointName,
        angle: f32,
        limit: f32,
    },

    #[error("leg {leg_index}: triangle inequality violated for sides {a:.2}, {b:.2}, {c:.2}")]
    TriangleInequality {
        leg_index: usize,
        a: f32,
        b: f32,
        c: f32,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("unknown direction '{0}'")]
    UnknownDirection(String),

    #[error("no active gait, call create_gait first")]
    NoActiveGait,

    #[error("gait thread is running")]
    GaitRunning,

    #[error("gait thread panicked")]
    GaitThreadPanicked,

    #[error("serial port error")]
    SerialPortError(#[from] serialport::Error),
    #[error("controller IO error")]
    ControllerIoError(#[from] std::io::Error),
    #[error("Yaml serde error")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Json serde error")]
    JsonError(#[from] serde_json::Error),
}
