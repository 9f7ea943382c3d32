pub mod maestro;

pub use maestro::MaestroController;

use crate::error::ScuttleResult;

/// Number of channels the controller exposes.
///
/// Eighteen are wired to leg servos, the rest stay unused but are still
/// included in whole-body writes so a single command covers the full channel
/// space.
pub const CONTROLLER_CHANNELS: u8 = 24;

/// Valid servo target range in quarter-microsecond counts.
///
/// Calibration endpoints outside this range are rejected at load time.
pub const SERVO_TARGET_MIN: u16 = 256;
pub const SERVO_TARGET_MAX: u16 = 16320;

/// Channel addressed servo controller.
///
/// Targets, speeds and accelerations are in the controller's native counts.
/// A target of 0 switches the servo off.
pub trait ServoController: Send {
    fn set_target(&mut self, channel: u8, target: u16) -> ScuttleResult<()>;

    fn set_speed(&mut self, channel: u8, speed: u16) -> ScuttleResult<()>;

    fn set_acceleration(&mut self, channel: u8, acceleration: u16) -> ScuttleResult<()>;

    /// Atomic multi-channel write. Channels must be sorted ascending.
    fn set_multiple_targets(&mut self, targets: &[(u8, u16)]) -> ScuttleResult<()>;

    /// True while at least one servo is still moving towards its target.
    fn get_moving_state(&mut self) -> ScuttleResult<bool>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::ServoController;
    use crate::error::ScuttleResult;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum RecordedCommand {
        Target { channel: u8, target: u16 },
        Speed { channel: u8, speed: u16 },
        Acceleration { channel: u8, acceleration: u16 },
        MultipleTargets(Vec<(u8, u16)>),
    }

    /// Controller double that records every command it receives.
    ///
    /// The command log and moving flag are shared handles so tests can keep
    /// inspecting them after the controller has been moved into a `Hexapod`
    /// or a gait thread.
    #[derive(Debug, Default)]
    pub(crate) struct MockServoController {
        commands: Arc<Mutex<Vec<RecordedCommand>>>,
        moving: Arc<AtomicBool>,
    }

    impl MockServoController {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn command_log(&self) -> Arc<Mutex<Vec<RecordedCommand>>> {
            Arc::clone(&self.commands)
        }

        pub(crate) fn moving_flag(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.moving)
        }
    }

    impl ServoController for MockServoController {
        fn set_target(&mut self, channel: u8, target: u16) -> ScuttleResult<()> {
            self.commands
                .lock()
                .unwrap()
                .push(RecordedCommand::Target { channel, target });
            Ok(())
        }

        fn set_speed(&mut self, channel: u8, speed: u16) -> ScuttleResult<()> {
            self.commands
                .lock()
                .unwrap()
                .push(RecordedCommand::Speed { channel, speed });
            Ok(())
        }

        fn set_acceleration(&mut self, channel: u8, acceleration: u16) -> ScuttleResult<()> {
            self.commands
                .lock()
                .unwrap()
                .push(RecordedCommand::Acceleration {
                    channel,
                    acceleration,
                });
            Ok(())
        }

        fn set_multiple_targets(&mut self, targets: &[(u8, u16)]) -> ScuttleResult<()> {
            self.commands
                .lock()
                .unwrap()
                .push(RecordedCommand::MultipleTargets(targets.to_vec()));
            Ok(())
        }

        fn get_moving_state(&mut self) -> ScuttleResult<bool> {
            Ok(self.moving.load(Ordering::SeqCst))
        }
    }
}
