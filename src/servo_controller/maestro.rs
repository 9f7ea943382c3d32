use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use super::ServoController;
use crate::error::ScuttleResult;

// Pololu protocol framing: sync byte, then the device number, then the
// command byte with its high bit cleared
const PROTOCOL_SYNC: u8 = 0xAA;
const DEVICE_NUMBER: u8 = 0x0C;

const SET_TARGET: u8 = 0x84;
const SET_SPEED: u8 = 0x87;
const SET_ACCELERATION: u8 = 0x89;
const SET_MULTIPLE_TARGETS: u8 = 0x9F;
const GET_MOVING_STATE: u8 = 0x93;

const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Pololu Maestro servo controller over UART.
///
/// Commands use the Pololu protocol: every frame starts with the 0xAA sync
/// byte and the device number, and the command byte is masked to seven
/// bits. Values are sent as 14 bit little endian pairs with the high bit of
/// each byte clear.
pub struct MaestroController {
    port: Box<dyn SerialPort>,
}

impl MaestroController {
    pub fn new(port_name: &str, baud_rate: u32) -> ScuttleResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()?;
        Ok(MaestroController { port })
    }
}

fn split_low_high(value: u16) -> [u8; 2] {
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

pub(crate) fn channel_command_frame(command: u8, channel: u8, value: u16) -> [u8; 6] {
    let [low, high] = split_low_high(value);
    [
        PROTOCOL_SYNC,
        DEVICE_NUMBER,
        command & 0x7F,
        channel,
        low,
        high,
    ]
}

pub(crate) fn multiple_targets_frame(first_channel: u8, targets: &[u16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5 + targets.len() * 2);
    frame.push(PROTOCOL_SYNC);
    frame.push(DEVICE_NUMBER);
    frame.push(SET_MULTIPLE_TARGETS & 0x7F);
    frame.push(targets.len() as u8);
    frame.push(first_channel);
    for target in targets {
        frame.extend_from_slice(&split_low_high(*target));
    }
    frame
}

/// Groups sorted channel/target pairs into runs of consecutive channels.
///
/// The Maestro multi-target command addresses a contiguous channel block, so
/// a sparse list is sent as one frame per run. Whole-body moves cover the
/// full channel space and collapse to a single frame.
pub(crate) fn contiguous_runs(targets: &[(u8, u16)]) -> Vec<(u8, Vec<u16>)> {
    let mut runs: Vec<(u8, Vec<u16>)> = Vec::new();
    for (channel, target) in targets {
        match runs.last_mut() {
            Some((first, values)) if *first + values.len() as u8 == *channel => {
                values.push(*target);
            }
            _ => runs.push((*channel, vec![*target])),
        }
    }
    runs
}

impl ServoController for MaestroController {
    fn set_target(&mut self, channel: u8, target: u16) -> ScuttleResult<()> {
        self.port
            .write_all(&channel_command_frame(SET_TARGET, channel, target))?;
        Ok(())
    }

    fn set_speed(&mut self, channel: u8, speed: u16) -> ScuttleResult<()> {
        self.port
            .write_all(&channel_command_frame(SET_SPEED, channel, speed))?;
        Ok(())
    }

    fn set_acceleration(&mut self, channel: u8, acceleration: u16) -> ScuttleResult<()> {
        self.port
            .write_all(&channel_command_frame(SET_ACCELERATION, channel, acceleration))?;
        Ok(())
    }

    fn set_multiple_targets(&mut self, targets: &[(u8, u16)]) -> ScuttleResult<()> {
        for (first_channel, run) in contiguous_runs(targets) {
            self.port
                .write_all(&multiple_targets_frame(first_channel, &run))?;
        }
        Ok(())
    }

    fn get_moving_state(&mut self) -> ScuttleResult<bool> {
        self.port
            .write_all(&[PROTOCOL_SYNC, DEVICE_NUMBER, GET_MOVING_STATE & 0x7F])?;
        let mut response = [0u8; 1];
        self.port.read_exact(&mut response)?;
        Ok(response[0] == 0x01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_frame_carries_header_and_seven_bit_pairs() {
        // 6000 quarter-microseconds = 1500 us, the servo midpoint
        let frame = channel_command_frame(SET_TARGET, 3, 6000);
        assert_eq!(frame, [0xAA, 0x0C, 0x84 & 0x7F, 3, 0x70, 0x2E]);
    }

    #[test]
    fn multiple_targets_frame_layout() {
        let frame = multiple_targets_frame(2, &[6000, 0]);
        assert_eq!(
            frame,
            vec![0xAA, 0x0C, 0x9F & 0x7F, 2, 2, 0x70, 0x2E, 0x00, 0x00]
        );
    }

    #[test]
    fn contiguous_channels_collapse_to_one_run() {
        let runs = contiguous_runs(&[(0, 10), (1, 20), (2, 30)]);
        assert_eq!(runs, vec![(0, vec![10, 20, 30])]);
    }

    #[test]
    fn channel_gaps_split_runs() {
        let runs = contiguous_runs(&[(0, 10), (1, 20), (5, 30), (6, 40)]);
        assert_eq!(runs, vec![(0, vec![10, 20]), (5, vec![30, 40])]);
    }
}
