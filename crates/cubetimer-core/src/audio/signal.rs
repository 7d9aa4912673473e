//! Stackmat test signal synthesis
//!
//! Renders packets into 8-bit audio the way a Stackmat timer puts them on
//! the line: idle (mark) level between packets, 1200 baud serial frames,
//! one packet per repeat interval. Used by the tests, the benchmark and
//! the `--simulate` mode of the binary.

use super::packet::{Packet, PACKET_LEN};
use super::reader::SampleSource;
use crate::STACKMAT_BAUD_RATE;
use std::io;
use std::time::{Duration, Instant};

/// Packet repeat interval as a fraction of the sample rate
const PACKET_SPAN_RATIO: f64 = 0.119171;

/// Stackmat signal generator
///
/// # Example
/// ```
/// use cubetimer_core::audio::packet::{Packet, Status};
/// use cubetimer_core::audio::signal::StackmatSignal;
///
/// let signal = StackmatSignal::new(8000);
/// let samples = signal.packet_samples(&Packet::new(Status::Idle, 0));
/// assert_eq!(samples.len(), 953);
/// ```
#[derive(Debug, Clone)]
pub struct StackmatSignal {
    /// Samples per bit
    period: f64,
    /// Samples per packet
    span: usize,
    /// Level of a logical 0
    low: u8,
    /// Level of a logical 1
    high: u8,
    /// Swap levels (reversed cabling)
    inverted: bool,
    /// Peak noise added to every sample
    noise: u8,
    /// PRNG state for noise generation
    noise_seed: u32,
}

impl StackmatSignal {
    /// Create a clean, normal-polarity generator
    pub fn new(sample_rate: u32) -> Self {
        Self {
            period: sample_rate as f64 / STACKMAT_BAUD_RATE as f64,
            span: (PACKET_SPAN_RATIO * sample_rate as f64) as usize,
            low: 64,
            high: 192,
            inverted: false,
            noise: 0,
            noise_seed: 1,
        }
    }

    /// Set the amplitude levels of logical 0 and 1
    pub fn with_levels(mut self, low: u8, high: u8) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Add uniform noise of at most `amplitude` to every sample
    pub fn with_noise(mut self, amplitude: u8, seed: u32) -> Self {
        self.noise = amplitude;
        self.noise_seed = seed.max(1);
        self
    }

    /// Samples per packet
    pub fn span(&self) -> usize {
        self.span
    }

    /// Idle samples before the first start bit of a packet
    fn lead_in(&self) -> usize {
        self.period.ceil() as usize
    }

    /// Logical level (true = mark) of sample `n` within a packet
    fn level_at(&self, bytes: &[u8; PACKET_LEN], n: usize) -> bool {
        let Some(rel) = n.checked_sub(self.lead_in()) else {
            return true;
        };

        let bit = (rel as f64 / self.period) as usize;
        if bit >= PACKET_LEN * 10 {
            return true;
        }

        match bit % 10 {
            0 => false,
            9 => true,
            k => (bytes[bit / 10] >> (k - 1)) & 1 == 1,
        }
    }

    fn next_noise(&mut self) -> i16 {
        if self.noise == 0 {
            return 0;
        }
        // xorshift32
        let mut x = self.noise_seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_seed = x;
        let range = 2 * self.noise as u32 + 1;
        (x % range) as i16 - self.noise as i16
    }

    /// Render one packet into exactly `span()` samples
    pub fn packet_samples(&self, packet: &Packet) -> Vec<u8> {
        let mut rng = self.clone();
        rng.render(packet)
    }

    fn render(&mut self, packet: &Packet) -> Vec<u8> {
        let bytes = packet.to_bytes();
        (0..self.span)
            .map(|n| {
                let mark = self.level_at(&bytes, n);
                let level = if mark != self.inverted { self.high } else { self.low };
                (level as i16 + self.next_noise()).clamp(0, 255) as u8
            })
            .collect()
    }

    /// Render packets back to back
    pub fn stream(&self, packets: &[Packet]) -> Vec<u8> {
        let mut rng = self.clone();
        packets.iter().flat_map(|p| rng.render(p)).collect()
    }
}

/// In-memory [`SampleSource`]
///
/// Replays a prepared sample buffer. With pacing enabled it hands out
/// samples no faster than the given sample rate, like a live line.
#[derive(Debug)]
pub struct SignalSource {
    samples: Vec<u8>,
    position: usize,
    pacing: Option<(u32, Instant)>,
}

impl SignalSource {
    pub fn new(samples: Vec<u8>) -> Self {
        Self {
            samples,
            position: 0,
            pacing: None,
        }
    }

    /// Deliver samples in real time at `sample_rate`
    pub fn paced(mut self, sample_rate: u32) -> Self {
        self.pacing = Some((sample_rate, Instant::now()));
        self
    }

    /// Samples not yet delivered
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl SampleSource for SignalSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "signal exhausted",
            ));
        }

        let mut available = self.remaining();
        if let Some((rate, started)) = self.pacing {
            let due = (started.elapsed().as_secs_f64() * rate as f64) as usize;
            if due <= self.position {
                std::thread::sleep(Duration::from_millis(5));
                return Ok(0);
            }
            available = available.min(due - self.position);
        }

        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::packet::Status;

    #[test]
    fn test_span_at_8khz() {
        let signal = StackmatSignal::new(8000);
        assert_eq!(signal.span(), 953);
        assert_eq!(signal.packet_samples(&Packet::new(Status::Idle, 0)).len(), 953);
    }

    #[test]
    fn test_clean_signal_uses_two_levels() {
        let signal = StackmatSignal::new(8000).with_levels(10, 240);
        let samples = signal.packet_samples(&Packet::new(Status::BothHands, 4560));
        assert!(samples.iter().all(|&s| s == 10 || s == 240));
        // Idle mark level before the first start bit
        assert_eq!(samples[0], 240);
    }

    #[test]
    fn test_inverted_idle_is_low() {
        let signal = StackmatSignal::new(8000).inverted(true);
        let samples = signal.packet_samples(&Packet::new(Status::Idle, 0));
        assert_eq!(samples[0], 64);
        assert_eq!(*samples.last().unwrap(), 64);
    }

    #[test]
    fn test_noise_stays_bounded() {
        let signal = StackmatSignal::new(8000).with_noise(20, 42);
        let samples = signal.packet_samples(&Packet::new(Status::Idle, 0));
        assert!(samples.iter().all(|&s| (44..=84).contains(&s) || (172..=212).contains(&s)));
    }

    #[test]
    fn test_signal_source_reads_then_eof() {
        let mut source = SignalSource::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
