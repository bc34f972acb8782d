// Feetech STS3215 serial protocol
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum; the checksum is the inverted
// low byte of the sum over ID..params. Status replies swap the instruction byte
// for an error byte.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for Feetech motors
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Encoder steps per wheel revolution
pub const STEPS_PER_REVOLUTION: f64 = 4096.0;

const HEADER: [u8; 2] = [0xFF, 0xFF];
const BROADCAST_ID: u8 = 0xFE;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// STS3215 control table entries used by the drive
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte
    GoalVelocity = 46,    // 2 bytes, sign-magnitude steps/s
    Lock = 55,            // 1 byte
    PresentPosition = 56, // 2 bytes, 0..4095
    PresentVelocity = 58, // 2 bytes, sign-magnitude steps/s
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + params.len());
    out.extend_from_slice(&HEADER);
    out.extend_from_slice(&[id, (params.len() + 2) as u8, instruction as u8]);
    out.extend_from_slice(params);
    out.push(checksum(&out[2..]));
    out
}

/// Bit 15 = direction (1 = negative), bits 0-14 = magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs().min(0x7FFF);
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// Feetech motor bus on a serial port
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, DEFAULT_BAUDRATE)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Send one instruction and return the status reply parameters
    fn request(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        self.port.write_all(&packet(id, instruction, params))?;
        self.port.flush()?;
        self.read_status(id)
    }

    fn read_status(&mut self, id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FeetechError::Timeout { id },
            _ => FeetechError::Io(e),
        })?;

        if head[..2] != HEADER || head[2] != id {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("unexpected header {:02X?}", head),
            });
        }

        // error byte + params + checksum
        let mut body = vec![0u8; head[3] as usize];
        self.port.read_exact(&mut body)?;
        let Some((&received, rest)) = body.split_last() else {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: "empty status packet".to_string(),
            });
        };

        let expected = !rest
            .iter()
            .chain(&head[2..])
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        if expected != received {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        match rest.split_first() {
            Some((&0, params)) => Ok(params.to_vec()),
            Some((&status, _)) => Err(FeetechError::MotorError { id, status }),
            None => Err(FeetechError::InvalidResponse {
                id,
                reason: "missing error byte".to_string(),
            }),
        }
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.request(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write motor {}: {:?}={}", id, register, value);
        self.request(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let reply = self.request(id, Instruction::Read, &[register as u8, 2])?;
        match reply[..] {
            [lo, hi, ..] => Ok(u16::from_le_bytes([lo, hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("expected 2 bytes, got {}", reply.len()),
            }),
        }
    }

    /// Write one signed 16-bit register on several motors in a single broadcast (no reply)
    pub fn sync_write_i16(&mut self, register: Register, data: &[(u8, i16)]) -> Result<()> {
        let mut params = Vec::with_capacity(2 + data.len() * 3);
        params.extend_from_slice(&[register as u8, 2]);
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&encode_sign_magnitude(value).to_le_bytes());
        }
        self.port
            .write_all(&packet(BROADCAST_ID, Instruction::SyncWrite, &params))?;
        self.port.flush()?;
        Ok(())
    }

    pub fn set_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, enabled as u8)?;
        self.write_u8(id, Register::Lock, enabled as u8)
    }

    /// Torque must be disabled first
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Present velocity in steps/s
    pub fn get_velocity(&mut self, id: u8) -> Result<i16> {
        Ok(decode_sign_magnitude(self.read_u16(id, Register::PresentVelocity)?))
    }

    /// Present position, 0..4095 within one revolution
    pub fn get_position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? & 0x0FFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum(&[1u8, 4, 0x03, 30, 0, 2]), 215);
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(i16::MIN), 0xFFFF);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
        assert_eq!(decode_sign_magnitude(100), 100);
    }

    #[test]
    fn test_sync_write_packet_layout() {
        let params = [Register::GoalVelocity as u8, 2, 1, 0x64, 0x80];
        let p = packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        assert_eq!(&p[..5], &[0xFF, 0xFF, 0xFE, 7, 0x83]);
        assert_eq!(p.len(), 6 + params.len());
        assert_eq!(*p.last().unwrap(), checksum(&p[2..p.len() - 1]));
    }
}
