//! Stackmat wire packet
//!
//! Each report from the timer is 9 bytes:
//!
//! ```text
//! [status][min][sec_tens][sec_units][csec_tens][csec_units][checksum]['\n']['\r']
//! ```
//!
//! The checksum is 64 plus the sum of the five digit values. Checksum and
//! terminators are the only correctness gate for a decoded candidate.

use std::fmt;

/// Number of bytes in a packet on the wire
pub const PACKET_LEN: usize = 9;

/// Status byte: pad and timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// No pad touched (`' '`)
    Idle,
    /// Both pads touched (`'A'`)
    BothHands,
    /// Both pads touched with the center sensor (`'C'`)
    Center,
    /// Inspection (`'I'`)
    Inspection,
    /// Left pad only (`'L'`)
    LeftHand,
    /// Right pad only (`'R'`)
    RightHand,
    /// Timer stopped (`'S'`)
    Stopped,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b' ' => Some(Status::Idle),
            b'A' => Some(Status::BothHands),
            b'C' => Some(Status::Center),
            b'I' => Some(Status::Inspection),
            b'L' => Some(Status::LeftHand),
            b'R' => Some(Status::RightHand),
            b'S' => Some(Status::Stopped),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Status::Idle => b' ',
            Status::BothHands => b'A',
            Status::Center => b'C',
            Status::Inspection => b'I',
            Status::LeftHand => b'L',
            Status::RightHand => b'R',
            Status::Stopped => b'S',
        }
    }

    pub fn left_hand_pressed(&self) -> bool {
        matches!(self, Status::BothHands | Status::LeftHand | Status::Center)
    }

    pub fn right_hand_pressed(&self) -> bool {
        matches!(self, Status::BothHands | Status::RightHand | Status::Center)
    }
}

/// A validated timer report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    pub status: Status,
    /// Digit values 0-9: minutes, tens of seconds, seconds,
    /// tens of centiseconds, centiseconds
    pub digits: [u8; 5],
}

impl Packet {
    /// Build a packet from a status and elapsed time (truncated to centiseconds)
    ///
    /// Times beyond the display range (9:59.99) saturate.
    pub fn new(status: Status, elapsed_ms: i64) -> Self {
        let centis = (elapsed_ms.max(0) / 10).min(59_999);
        let minutes = centis / 6000;
        let seconds = (centis / 100) % 60;
        let rest = centis % 100;
        Self {
            status,
            digits: [
                minutes as u8,
                (seconds / 10) as u8,
                (seconds % 10) as u8,
                (rest / 10) as u8,
                (rest % 10) as u8,
            ],
        }
    }

    /// Validate a raw 9-byte candidate
    pub fn from_bytes(data: &[u8; PACKET_LEN]) -> Option<Self> {
        let status = Status::from_byte(data[0])?;

        let mut digits = [0u8; 5];
        for (digit, &byte) in digits.iter_mut().zip(&data[1..6]) {
            if !byte.is_ascii_digit() {
                return None;
            }
            *digit = byte - b'0';
        }

        let sum: u32 = digits.iter().map(|&d| d as u32).sum();
        if data[6] as u32 != 64 + sum || data[7] != b'\n' || data[8] != b'\r' {
            return None;
        }

        Some(Self { status, digits })
    }

    /// Encode to the 9 wire bytes, checksum and terminators included
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut data = [0u8; PACKET_LEN];
        data[0] = self.status.as_byte();
        for (byte, &digit) in data[1..6].iter_mut().zip(&self.digits) {
            *byte = b'0' + digit;
        }
        data[6] = 64 + self.digits.iter().sum::<u8>();
        data[7] = b'\n';
        data[8] = b'\r';
        data
    }

    /// The six meaningful bytes (status + digits), used as vote key
    pub fn key(&self) -> [u8; 6] {
        let bytes = self.to_bytes();
        let mut key = [0u8; 6];
        key.copy_from_slice(&bytes[..6]);
        key
    }

    /// Elapsed time reported by the timer, in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        let [m, st, su, ct, cu] = self.digits.map(|d| d as i64);
        60000 * m + 1000 * (10 * st + su) + 10 * (10 * ct + cu)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [m, st, su, ct, cu] = self.digits;
        write!(
            f,
            "[{}] {}:{}{}.{}{}",
            self.status.as_byte() as char,
            m,
            st,
            su,
            ct,
            cu
        )
    }
}
