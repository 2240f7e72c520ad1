use crate::config::Parameters;
use crate::engine::Engine;
use crate::error::{ModemError, Result};
use crate::framing::{self, Header};
use crate::fsk::{FskDemodulator, FskModulator};
use crate::protocol::{Family, ProtocolId};
use crate::resample::{resample_audio, StreamResampler};
use crate::sync::{find_marker, marker_len, MarkerSearch};
use crate::{HEADER_FRAMES, MARKER_FRAMES, MAX_PAYLOAD_SIZE, MAX_VOLUME};
use log::{debug, warn};

struct PendingTx {
    payload: Vec<u8>,
    protocol: ProtocolId,
    volume: f32,
}

enum RxState {
    Searching,
    Receiving {
        /// Offset of the header symbol in the receive buffer
        data_start: usize,
        family: Family,
        header: Option<Header>,
    },
}

/// Reference multi-tone FSK engine
///
/// A transmission is `marker | header symbol | payload ‖ CRC-16`. The
/// receiver keeps a buffer of unconsumed samples at the operating rate and
/// walks it with a small state machine, so a transmission may arrive spread
/// over any number of [`decode`](Engine::decode) calls.
pub struct Modem {
    params: Parameters,
    modulator: FskModulator,
    demodulator: FskDemodulator,
    tx: Option<PendingTx>,
    tx_output: Vec<f32>,
    rx_resampler: StreamResampler,
    rx_buffer: Vec<f32>,
    rx_state: RxState,
    rx_data: Vec<u8>,
}

impl Modem {
    fn frame_samples(&self) -> usize {
        self.params.frame_samples()
    }

    fn header_samples(&self) -> usize {
        HEADER_FRAMES * self.frame_samples()
    }

    fn symbol_samples(&self, protocol: ProtocolId) -> usize {
        protocol.frames_per_symbol() * self.frame_samples()
    }

    /// Highest usable frequency given the operating and playback rates
    fn nyquist(&self) -> (f32, u32) {
        let rate = self.params.sample_rate.min(self.params.sample_rate_out);
        (rate as f32 / 2.0, rate)
    }

    fn check_protocol(&self, protocol: ProtocolId) -> Result<()> {
        let max_freq = (protocol.family().end_bin() - 1) as f32 * self.params.hz_per_bin();
        let (nyquist, rate) = self.nyquist();
        if max_freq >= nyquist {
            return Err(ModemError::ProtocolAboveNyquist {
                protocol: protocol.id(),
                max_freq,
                sample_rate: rate,
            });
        }
        Ok(())
    }

    fn render(&self, tx: &PendingTx) -> Result<Vec<f32>> {
        let family = tx.protocol.family();
        let amplitude = tx.volume / MAX_VOLUME;
        let header = Header::new(tx.protocol, tx.payload.len())?;
        let data = framing::encode_payload(&tx.payload);

        let mut samples = self.modulator.marker(family, MARKER_FRAMES, amplitude);
        samples.extend(
            self.modulator
                .modulate_symbol(&header.encode(), family, HEADER_FRAMES, amplitude)?,
        );
        samples.extend(self.modulator.modulate(
            &data,
            family,
            tx.protocol.frames_per_symbol(),
            amplitude,
        )?);

        Ok(samples)
    }

    /// Advance the receive state machine as far as the buffered samples allow
    fn process_rx(&mut self) -> usize {
        loop {
            match self.rx_state {
                RxState::Searching => match find_marker(&self.demodulator, &self.rx_buffer) {
                    MarkerSearch::Found(found) => {
                        debug!(
                            "Marker found at {} ({:?}, score {:.2})",
                            found.offset, found.family, found.score
                        );
                        self.rx_state = RxState::Receiving {
                            data_start: found.offset + marker_len(&self.demodulator),
                            family: found.family,
                            header: None,
                        };
                    }
                    MarkerSearch::NotFound { resume_at } => {
                        self.rx_buffer.drain(..resume_at.min(self.rx_buffer.len()));
                        return 0;
                    }
                },
                RxState::Receiving {
                    data_start,
                    family,
                    header,
                } => {
                    let header = match header {
                        Some(header) => header,
                        None => {
                            let header_end = data_start + self.header_samples();
                            if self.rx_buffer.len() < header_end {
                                return 0;
                            }
                            match self.read_header(&self.rx_buffer[data_start..header_end], family) {
                                Ok(header) => {
                                    self.rx_state = RxState::Receiving {
                                        data_start,
                                        family,
                                        header: Some(header),
                                    };
                                    header
                                }
                                Err(e) => {
                                    debug!("Discarding marker: {}", e);
                                    self.resync(data_start);
                                    continue;
                                }
                            }
                        }
                    };

                    let payload_start = data_start + self.header_samples();
                    let payload_end =
                        payload_start + header.data_symbols() * self.symbol_samples(header.protocol);
                    if self.rx_buffer.len() < payload_end {
                        return 0;
                    }

                    let decoded = self
                        .demodulator
                        .demodulate(
                            &self.rx_buffer[payload_start..payload_end],
                            family,
                            header.protocol.frames_per_symbol(),
                        )
                        .and_then(|bytes| framing::decode_payload(&bytes, header.payload_len));

                    match decoded {
                        Ok(payload) => {
                            self.rx_buffer.drain(..payload_end);
                            self.rx_state = RxState::Searching;
                            let count = payload.len();
                            debug!("Received {} bytes ({})", count, header.protocol);
                            self.rx_data = payload;
                            return count;
                        }
                        Err(e) => {
                            warn!("Dropping {} frame: {}", header.protocol, e);
                            self.resync(data_start);
                        }
                    }
                }
            }
        }
    }

    fn read_header(&self, samples: &[f32], family: Family) -> Result<Header> {
        let bytes = self.demodulator.demodulate_symbol(samples, family)?;
        let header = Header::decode(&bytes)?;
        if header.protocol.family() != family {
            return Err(ModemError::HeaderCrcMismatch);
        }
        Ok(header)
    }

    /// Forget the current marker and search again after it
    fn resync(&mut self, data_start: usize) {
        self.rx_buffer.drain(..data_start.min(self.rx_buffer.len()));
        self.rx_state = RxState::Searching;
    }
}

impl Engine for Modem {
    fn new(params: &Parameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params: *params,
            modulator: FskModulator::new(params),
            demodulator: FskDemodulator::new(params),
            tx: None,
            tx_output: Vec::new(),
            rx_resampler: StreamResampler::new(params.sample_rate_inp, params.sample_rate),
            rx_buffer: Vec::new(),
            rx_state: RxState::Searching,
            rx_data: Vec::new(),
        })
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn init(&mut self, payload: &[u8], protocol: ProtocolId, volume: f32) -> Result<()> {
        if payload.is_empty() {
            return Err(ModemError::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ModemError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if !volume.is_finite() || !(0.0..=MAX_VOLUME).contains(&volume) {
            return Err(ModemError::InvalidVolume(volume));
        }
        self.check_protocol(protocol)?;

        self.tx_output.clear();
        self.tx = Some(PendingTx {
            payload: payload.to_vec(),
            protocol,
            volume,
        });
        Ok(())
    }

    fn encode(&mut self) -> Result<usize> {
        let tx = self.tx.as_ref().ok_or(ModemError::NothingToEncode)?;
        let mut samples = self.render(tx)?;

        if self.params.sample_rate != self.params.sample_rate_out {
            // A receiver interpolating back needs input past the last sample
            let tail = self.params.sample_rate.div_ceil(self.params.sample_rate_out) as usize + 1;
            samples.resize(samples.len() + tail, 0.0);
        }
        self.tx_output = resample_audio(&samples, self.params.sample_rate, self.params.sample_rate_out);
        Ok(self.tx_output.len())
    }

    fn output(&self, out: &mut [f32]) -> Result<usize> {
        if self.tx_output.is_empty() {
            return Err(ModemError::NothingToEncode);
        }
        if out.len() < self.tx_output.len() {
            return Err(ModemError::OutputBufferTooSmall {
                required: self.tx_output.len(),
                provided: out.len(),
            });
        }
        out[..self.tx_output.len()].copy_from_slice(&self.tx_output);
        Ok(self.tx_output.len())
    }

    fn decode(&mut self, samples: &[f32]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        self.rx_resampler.process(samples, &mut self.rx_buffer);
        Ok(self.process_rx())
    }

    fn take_rx_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.rx_data)
    }

    fn reset(&mut self) {
        self.tx = None;
        self.tx_output.clear();
        self.rx_resampler.reset();
        self.rx_buffer.clear();
        self.rx_state = RxState::Searching;
        self.rx_data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modem() -> Modem {
        Modem::new(&Parameters::default()).unwrap()
    }

    fn transmit(modem: &mut Modem, payload: &[u8], protocol: ProtocolId) -> Vec<f32> {
        modem.init(payload, protocol, 50.0).unwrap();
        let count = modem.encode().unwrap();
        let mut out = vec![0.0f32; count];
        assert_eq!(modem.output(&mut out).unwrap(), count);
        out
    }

    #[test]
    fn test_round_trip_single_call() {
        let mut tx = modem();
        let mut rx = modem();
        let samples = transmit(&mut tx, b"Hello", ProtocolId::AudibleFast);

        assert_eq!(rx.decode(&samples).unwrap(), 5);
        assert_eq!(rx.take_rx_data(), b"Hello");
        assert!(rx.take_rx_data().is_empty());
    }

    #[test]
    fn test_waveform_length_matches_layout() {
        let mut tx = modem();
        let samples = transmit(&mut tx, b"Hello", ProtocolId::AudibleNormal);
        // marker 16 frames, header 6 frames, 3 symbols of 9 frames
        assert_eq!(samples.len(), (16 + 6 + 27) * 1024);
    }

    #[test]
    fn test_init_rejections() {
        let mut tx = modem();
        assert_eq!(
            tx.init(b"", ProtocolId::AudibleFast, 50.0),
            Err(ModemError::EmptyPayload)
        );
        assert!(matches!(
            tx.init(&[b'x'; MAX_PAYLOAD_SIZE + 1], ProtocolId::AudibleFast, 50.0),
            Err(ModemError::PayloadTooLarge { .. })
        ));
        assert!(matches!(
            tx.init(b"hi", ProtocolId::AudibleFast, 150.0),
            Err(ModemError::InvalidVolume(_))
        ));
        assert!(matches!(
            tx.init(b"hi", ProtocolId::AudibleFast, f32::NAN),
            Err(ModemError::InvalidVolume(_))
        ));
    }

    #[test]
    fn test_encode_without_init() {
        let mut tx = modem();
        assert_eq!(tx.encode(), Err(ModemError::NothingToEncode));
        let mut out = [0.0f32; 4];
        assert_eq!(tx.output(&mut out), Err(ModemError::NothingToEncode));
    }

    #[test]
    fn test_output_buffer_too_small() {
        let mut tx = modem();
        tx.init(b"abc", ProtocolId::AudibleFastest, 10.0).unwrap();
        let count = tx.encode().unwrap();
        let mut out = vec![0.0f32; count - 1];
        assert_eq!(
            tx.output(&mut out),
            Err(ModemError::OutputBufferTooSmall {
                required: count,
                provided: count - 1
            })
        );
    }

    #[test]
    fn test_ultrasound_rejected_at_low_rate() {
        let mut tx = Modem::new(&Parameters::uniform(16000).unwrap()).unwrap();
        assert!(matches!(
            tx.init(b"hi", ProtocolId::UltrasoundNormal, 50.0),
            Err(ModemError::ProtocolAboveNyquist { protocol: 3, .. })
        ));
        assert!(tx.init(b"hi", ProtocolId::AudibleNormal, 50.0).is_ok());
    }

    #[test]
    fn test_streaming_decode_completes_on_last_chunk() {
        let mut tx = modem();
        let mut rx = modem();
        let mut samples = vec![0.0f32; 3000];
        samples.extend(transmit(&mut tx, b"stream", ProtocolId::AudibleFastest));
        samples.extend(vec![0.0f32; 2000]);

        let mut hits = Vec::new();
        for (index, chunk) in samples.chunks(1024).enumerate() {
            let count = rx.decode(chunk).unwrap();
            if count > 0 {
                hits.push((index, rx.take_rx_data()));
            }
        }

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, b"stream");
    }

    #[test]
    fn test_receive_buffer_stays_bounded_on_silence() {
        let mut rx = modem();
        let silence = vec![0.0f32; 4096];
        for _ in 0..50 {
            assert_eq!(rx.decode(&silence).unwrap(), 0);
        }
        assert!(rx.rx_buffer.len() <= marker_len(&rx.demodulator) + 4096);
    }

    #[test]
    fn test_reset_drops_partial_reception() {
        let mut tx = modem();
        let mut rx = modem();
        let samples = transmit(&mut tx, b"partial", ProtocolId::AudibleFast);
        let half = samples.len() / 2;

        assert_eq!(rx.decode(&samples[..half]).unwrap(), 0);
        rx.reset();
        assert_eq!(rx.decode(&samples[half..]).unwrap(), 0);
        assert!(rx.take_rx_data().is_empty());
    }

    #[test]
    fn test_resampled_output_decodes_on_matching_input_rate() {
        let params = Parameters {
            sample_rate_inp: 48000,
            sample_rate_out: 44100,
            sample_rate: 48000,
        };
        let mut tx = Modem::new(&params).unwrap();
        tx.init(b"resample", ProtocolId::AudibleNormal, 80.0).unwrap();
        let count = tx.encode().unwrap();
        let mut out = vec![0.0f32; count];
        tx.output(&mut out).unwrap();

        let rx_params = Parameters {
            sample_rate_inp: 44100,
            sample_rate_out: 48000,
            sample_rate: 48000,
        };
        let mut rx = Modem::new(&rx_params).unwrap();
        assert_eq!(rx.decode(&out).unwrap(), 8);
        assert_eq!(rx.take_rx_data(), b"resample");
    }

    #[test]
    fn test_split_rate_stream_decodes_in_small_chunks() {
        let tx_params = Parameters::new(48000, 44100).unwrap();
        let rx_params = Parameters::new(44100, 48000).unwrap();

        for protocol in [ProtocolId::AudibleNormal, ProtocolId::UltrasoundFast] {
            let mut tx = Modem::new(&tx_params).unwrap();
            let mut samples = vec![0.0f32; 3000];
            samples.extend(transmit(&mut tx, b"chunked", protocol));
            samples.extend(vec![0.0f32; 20000]);

            for chunk in [256, 512] {
                let mut rx = Modem::new(&rx_params).unwrap();
                let mut received = Vec::new();
                for block in samples.chunks(chunk) {
                    if rx.decode(block).unwrap() > 0 {
                        received.push(rx.take_rx_data());
                    }
                }
                assert_eq!(received, vec![b"chunked".to_vec()], "{} in {}-sample chunks", protocol, chunk);
            }
        }
    }

    #[test]
    fn test_reset_clears_resampler_position() {
        let tx_params = Parameters::new(48000, 44100).unwrap();
        let rx_params = Parameters::new(44100, 48000).unwrap();
        let mut tx = Modem::new(&tx_params).unwrap();
        let samples = transmit(&mut tx, b"again", ProtocolId::AudibleFastest);

        let mut rx = Modem::new(&rx_params).unwrap();
        assert_eq!(rx.decode(&samples[..777]).unwrap(), 0);
        rx.reset();
        assert!(rx.rx_buffer.is_empty());

        for block in samples.chunks(300) {
            if rx.decode(block).unwrap() > 0 {
                assert_eq!(rx.take_rx_data(), b"again");
                return;
            }
        }
        panic!("transmission not decoded after reset");
    }
}
