//! Stackmat signal demodulation
//!
//! The timer transmits its packets as 1200 baud serial data over the audio
//! line: every byte is framed by a start bit, 8 data bits (LSB first) and a
//! stop bit. There is no clock line, the amplitude levels depend on the
//! input gain, and the polarity depends on the cabling, so the decoder:
//!
//! 1. scans candidate sample offsets at the start of the buffer, trying
//!    every amplitude threshold under both polarities until a candidate
//!    passes the packet validation (framing bits, checksum, terminators);
//! 2. re-decodes the packet at every sample position within one bit period
//!    of that offset, at every threshold, and keeps the decoding that
//!    occurs most often.
//!
//! The vote makes the result robust against single-sample jitter and noise
//! that flips individual reads.

use super::packet::{Packet, PACKET_LEN};
use crate::STACKMAT_BAUD_RATE;

/// Packet repeat interval as a fraction of the sample rate
const PACKET_SPAN_RATIO: f64 = 0.119171;

/// Bit cells per byte: start + 8 data + stop
const BITS_PER_BYTE: usize = 10;

/// Result of scanning one buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Majority decoding, if a packet start was found
    pub packet: Option<Packet>,
    /// Samples at the front of the buffer that can be discarded
    pub consumed: usize,
}

/// Stateless Stackmat packet decoder for a fixed sample rate
#[derive(Debug, Clone)]
pub struct StackmatDecoder {
    /// Sample rate in Hz
    sample_rate: u32,
    /// Samples per bit
    period: f64,
    /// Samples per packet repeat
    packet_span: f64,
    /// Working buffer size
    buffer_len: usize,
}

impl StackmatDecoder {
    /// Create a decoder for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let period = sample_rate as f64 / STACKMAT_BAUD_RATE as f64;
        let packet_span = PACKET_SPAN_RATIO * sample_rate as f64;
        let minimum = packet_span.ceil() as usize + period.ceil() as usize + 1;
        let buffer_len = (sample_rate as usize / 8).max(minimum);

        Self {
            sample_rate,
            period,
            packet_span,
            buffer_len,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per bit
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Samples between the starts of two consecutive packets
    pub fn packet_span(&self) -> f64 {
        self.packet_span
    }

    /// Size of the sliding sample buffer the reader should keep
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Sample index of bit cell `bit` for a frame starting at `offset`
    fn bit_index(&self, offset: usize, bit: usize) -> usize {
        offset + (bit as f64 * self.period) as usize
    }

    /// Read the 9 raw bytes of a frame starting at `offset`
    ///
    /// A sample above `threshold` is a high level. In normal polarity a
    /// start bit is low and a stop bit high; inverted polarity swaps the
    /// levels and complements the data bits. Returns `None` as soon as a
    /// framing bit does not match or the frame runs past the buffer.
    pub fn read_packet(
        &self,
        samples: &[u8],
        offset: usize,
        threshold: u8,
        inverted: bool,
    ) -> Option<[u8; PACKET_LEN]> {
        let mut data = [0u8; PACKET_LEN];

        for (i, byte) in data.iter_mut().enumerate() {
            let first_bit = BITS_PER_BYTE * i;

            let start_low = *samples.get(self.bit_index(offset, first_bit))? <= threshold;
            if start_low == inverted {
                return None;
            }

            let mut value = 0u8;
            for j in 0..8 {
                if *samples.get(self.bit_index(offset, first_bit + j + 1))? > threshold {
                    value |= 1 << j;
                }
            }
            *byte = if inverted { !value } else { value };

            let stop_low = *samples.get(self.bit_index(offset, first_bit + 9))? <= threshold;
            if stop_low != inverted {
                return None;
            }
        }

        Some(data)
    }

    /// Read and validate a frame
    pub fn decode_at(
        &self,
        samples: &[u8],
        offset: usize,
        threshold: u8,
        inverted: bool,
    ) -> Option<Packet> {
        self.read_packet(samples, offset, threshold, inverted)
            .and_then(|data| Packet::from_bytes(&data))
    }

    /// Number of leading offsets that leave room for a whole packet
    fn scan_limit(&self, len: usize) -> usize {
        let mut limit = 0;
        while (limit as f64) + self.packet_span < len as f64 {
            limit += 1;
        }
        limit
    }

    /// Find the first offset holding a valid packet
    ///
    /// # Returns
    /// `(offset, inverted)` of the first valid decoding
    pub fn find_packet_start(&self, samples: &[u8]) -> Option<(usize, bool)> {
        for offset in 0..self.scan_limit(samples.len()) {
            for threshold in 0..=u8::MAX {
                if self.decode_at(samples, offset, threshold, false).is_some() {
                    return Some((offset, false));
                }
                if self.decode_at(samples, offset, threshold, true).is_some() {
                    return Some((offset, true));
                }
            }
        }
        None
    }

    /// Majority vote over all re-reads within one bit period of `offset`
    ///
    /// Ties go to the decoding observed first.
    pub fn vote(&self, samples: &[u8], offset: usize, inverted: bool) -> Option<Packet> {
        let mut histogram: Vec<(Packet, usize)> = Vec::new();

        for shift in 0..self.period.ceil() as usize {
            for threshold in 0..=u8::MAX {
                let Some(packet) = self.decode_at(samples, offset + shift, threshold, inverted)
                else {
                    continue;
                };

                match histogram.iter_mut().find(|(p, _)| p.key() == packet.key()) {
                    Some((_, count)) => *count += 1,
                    None => histogram.push((packet, 1)),
                }
            }
        }

        tracing::trace!(
            offset,
            inverted,
            candidates = histogram.len(),
            "packet_histogram"
        );

        let mut best: Option<(Packet, usize)> = None;
        for (packet, count) in histogram {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((packet, count));
            }
        }
        best.map(|(packet, _)| packet)
    }

    /// Scan a buffer: locate a packet, vote on it and report how many
    /// samples the caller can drop before the next scan
    pub fn scan(&self, samples: &[u8]) -> Scan {
        match self.find_packet_start(samples) {
            Some((offset, inverted)) => {
                let packet = self.vote(samples, offset, inverted);
                let consumed = ((offset as f64 + self.packet_span) as usize).min(samples.len());
                Scan { packet, consumed }
            }
            None => Scan {
                packet: None,
                consumed: self.scan_limit(samples.len()).max(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::packet::Status;
    use crate::audio::signal::StackmatSignal;

    fn buffer_with(signal: &StackmatSignal, packet: &Packet, len: usize) -> Vec<u8> {
        let mut samples = signal.stream(&[*packet, *packet]);
        samples.truncate(len);
        samples
    }

    #[test]
    fn test_geometry_at_8khz() {
        let decoder = StackmatDecoder::new(8000);
        assert!((decoder.period() - 6.6667).abs() < 0.001);
        assert_eq!(decoder.buffer_len(), 1000);
        assert!((decoder.packet_span() - 953.368).abs() < 0.001);
    }

    #[test]
    fn test_buffer_len_covers_packet_at_low_rates() {
        let decoder = StackmatDecoder::new(4000);
        assert!(decoder.buffer_len() as f64 > decoder.packet_span());
    }

    #[test]
    fn test_decode_normal_polarity() {
        let decoder = StackmatDecoder::new(8000);
        let signal = StackmatSignal::new(8000);
        let packet = Packet::new(Status::Stopped, 12340);
        let samples = buffer_with(&signal, &packet, decoder.buffer_len());

        let scan = decoder.scan(&samples);
        assert_eq!(scan.packet, Some(packet));
        assert!(scan.consumed > decoder.packet_span() as usize);
    }

    #[test]
    fn test_decode_inverted_polarity() {
        let decoder = StackmatDecoder::new(8000);
        let signal = StackmatSignal::new(8000).inverted(true);
        let packet = Packet::new(Status::LeftHand, 0);
        let samples = buffer_with(&signal, &packet, decoder.buffer_len());

        let (_, inverted) = decoder.find_packet_start(&samples).unwrap();
        assert!(inverted);
        assert_eq!(decoder.scan(&samples).packet, Some(packet));
    }

    #[test]
    fn test_read_packet_rejects_framing_mismatch() {
        let decoder = StackmatDecoder::new(8000);
        let signal = StackmatSignal::new(8000);
        let packet = Packet::new(Status::Idle, 0);
        let samples = buffer_with(&signal, &packet, decoder.buffer_len());
        let (offset, _) = decoder.find_packet_start(&samples).unwrap();

        // Wrong polarity fails on the first start bit
        assert!(decoder.read_packet(&samples, offset, 128, true).is_none());
        // A threshold above both levels reads every bit low
        assert!(decoder.read_packet(&samples, offset, 255, false).is_none());
    }

    #[test]
    fn test_read_packet_out_of_range() {
        let decoder = StackmatDecoder::new(8000);
        let samples = vec![0u8; 100];
        assert!(decoder.read_packet(&samples, 0, 128, true).is_none());
    }

    #[test]
    fn test_silence_yields_nothing() {
        let decoder = StackmatDecoder::new(8000);
        for level in [0u8, 128, 255] {
            let samples = vec![level; decoder.buffer_len()];
            let scan = decoder.scan(&samples);
            assert_eq!(scan.packet, None);
            assert_eq!(scan.consumed, 47);
        }
    }

    #[test]
    fn test_vote_prefers_majority() {
        let decoder = StackmatDecoder::new(8000);
        let signal = StackmatSignal::new(8000).with_noise(30, 7);
        let packet = Packet::new(Status::Center, 61230);
        let samples = buffer_with(&signal, &packet, decoder.buffer_len());

        assert_eq!(decoder.scan(&samples).packet, Some(packet));
    }
}
