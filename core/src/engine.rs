use crate::config::Parameters;
use crate::error::Result;
use crate::protocol::ProtocolId;

/// Contract the transcode bridge consumes from an audio modem engine
///
/// Transmission is a three step affair: [`init`](Engine::init) stages a
/// payload, [`encode`](Engine::encode) renders it and reports the sample
/// count, [`output`](Engine::output) copies the rendered waveform into a
/// caller-sized buffer.
///
/// Reception is streaming. [`decode`](Engine::decode) may be fed arbitrary
/// slices of captured audio; it returns the number of payload bytes that
/// became available with this call, `0` meaning "nothing complete yet".
/// The payload is then drained with [`take_rx_data`](Engine::take_rx_data).
pub trait Engine: Send + Sized {
    fn new(params: &Parameters) -> Result<Self>;

    fn parameters(&self) -> &Parameters;

    /// Stage `payload` for transmission
    fn init(&mut self, payload: &[u8], protocol: ProtocolId, volume: f32) -> Result<()>;

    /// Render the staged payload, returning the number of output samples
    fn encode(&mut self) -> Result<usize>;

    /// Copy the rendered waveform into `out`, returning the samples written
    fn output(&self, out: &mut [f32]) -> Result<usize>;

    /// Feed captured samples, returning newly decoded payload bytes
    ///
    /// Samples are buffered across calls. A call completes at most one
    /// payload; when the buffer holds further complete transmissions they
    /// are returned by later calls, so a caller at end of input keeps
    /// calling until nothing more is decoded.
    fn decode(&mut self, samples: &[f32]) -> Result<usize>;

    fn take_rx_data(&mut self) -> Vec<u8>;

    /// Drop any staged transmission and partial reception state
    fn reset(&mut self);

    /// Protocols this engine can transmit and receive, in id order
    fn protocols() -> &'static [ProtocolId] {
        &ProtocolId::ALL
    }
}
