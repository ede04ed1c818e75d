//! WAV ingestion: bytes → normalized 16 kHz mono `f32` signal.
//!
//! Three modes (see [`WavMode`]):
//! - `Raw` skips a fixed 44-byte header and reads little-endian `i16` PCM
//!   without looking at the header. Mismatched input yields wrong samples,
//!   not an error.
//! - `Strict` parses the container and rejects anything but 16 kHz mono
//!   16-bit PCM with [`TranscriptionError::MalformedAudio`].
//! - `Resample` decodes any supported WAV, mixes to mono and resamples to
//!   16 kHz.
//!
//! Raw and strict decoding both scale by `1 / 32768`, so a canonical file
//! decodes to identical samples in either mode.

use std::io::{Cursor, Read};
use std::path::Path;

use hark_settings::WavMode;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16LE, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::types::{AudioSignal, ResultExt, TranscriptionError};

/// Sample rate the model expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Size of the canonical RIFF/WAVE header skipped in raw mode.
pub const WAV_HEADER_LEN: usize = 44;

const PCM16_SCALE: f32 = 32_768.0;

/// Turns WAV bytes into an [`AudioSignal`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioDecoder {
    mode: WavMode,
}

impl AudioDecoder {
    /// Create a decoder using `mode`.
    pub fn new(mode: WavMode) -> Self {
        Self { mode }
    }

    /// The configured mode.
    pub fn mode(&self) -> WavMode {
        self.mode
    }

    /// Decode an in-memory WAV container.
    pub fn decode(&self, data: &[u8]) -> Result<AudioSignal, TranscriptionError> {
        let signal = match self.mode {
            WavMode::Raw => AudioSignal::new(decode_pcm16_raw(data), TARGET_SAMPLE_RATE),
            WavMode::Strict => decode_strict(data)?,
            WavMode::Resample => decode_resampled(data)?,
        };
        debug!(
            mode = ?self.mode,
            bytes = data.len(),
            samples = signal.len(),
            "decoded audio"
        );
        Ok(signal)
    }

    /// Read the whole stream, then decode it.
    ///
    /// A failing reader surfaces as [`TranscriptionError::AudioRead`].
    pub fn decode_reader<R: Read>(&self, mut reader: R) -> Result<AudioSignal, TranscriptionError> {
        let mut data = Vec::new();
        let _ = reader.read_to_end(&mut data).audio_read("read audio stream")?;
        self.decode(&data)
    }
}

/// Read an audio file into memory.
pub fn read_audio_file(path: impl AsRef<Path>) -> Result<Vec<u8>, TranscriptionError> {
    let path = path.as_ref();
    std::fs::read(path).audio_read(&format!("read {}", path.display()))
}

/// Skip [`WAV_HEADER_LEN`] bytes and read the rest as little-endian `i16`.
///
/// Payloads no longer than the header give an empty vector; a trailing odd
/// byte is dropped.
pub fn decode_pcm16_raw(data: &[u8]) -> Vec<f32> {
    data.get(WAV_HEADER_LEN..)
        .unwrap_or_default()
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM16_SCALE)
        .collect()
}

fn probe(data: &[u8]) -> Result<Box<dyn FormatReader>, TranscriptionError> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    let _ = hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .malformed("probe failed")?;
    Ok(probed.format)
}

/// Feed every packet of `track_id` through `decoder` into `sink`.
fn drain_packets(
    format: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    mut sink: impl FnMut(AudioBufferRef<'_>),
) -> Result<(), TranscriptionError> {
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(TranscriptionError::MalformedAudio(format!(
                    "packet read: {e}"
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).malformed("decode")?;
        sink(decoded);
    }
    Ok(())
}

fn decode_strict(data: &[u8]) -> Result<AudioSignal, TranscriptionError> {
    let mut format = probe(data)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TranscriptionError::MalformedAudio("no audio track found".into()))?;
    let params = track.codec_params.clone();
    let track_id = track.id;

    if params.codec != CODEC_TYPE_PCM_S16LE {
        let name = symphonia::default::get_codecs()
            .get_codec(params.codec)
            .map_or("unknown", |d| d.short_name);
        return Err(TranscriptionError::MalformedAudio(format!(
            "expected 16-bit signed PCM, found {name}"
        )));
    }
    let channels = params.channels.map_or(0, |c| c.count());
    if channels != 1 {
        return Err(TranscriptionError::MalformedAudio(format!(
            "expected mono, found {channels} channels"
        )));
    }
    match params.sample_rate {
        Some(TARGET_SAMPLE_RATE) => {}
        Some(rate) => {
            return Err(TranscriptionError::MalformedAudio(format!(
                "expected {TARGET_SAMPLE_RATE} Hz, found {rate} Hz"
            )));
        }
        None => {
            return Err(TranscriptionError::MalformedAudio(
                "sample rate missing from header".into(),
            ));
        }
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .malformed("codec init failed")?;

    let mut samples: Vec<f32> = Vec::new();
    drain_packets(format.as_mut(), decoder.as_mut(), track_id, |decoded| {
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend(buf.samples().iter().map(|&s| f32::from(s) / PCM16_SCALE));
    })?;

    Ok(AudioSignal::new(samples, TARGET_SAMPLE_RATE))
}

fn decode_resampled(data: &[u8]) -> Result<AudioSignal, TranscriptionError> {
    let mut format = probe(data)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TranscriptionError::MalformedAudio("no audio track found".into()))?;
    let params = track.codec_params.clone();
    let track_id = track.id;
    let source_rate = params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let channels = params.channels.map_or(1, |c| c.count()).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .malformed("codec init failed")?;

    let mut mono: Vec<f32> = Vec::new();
    drain_packets(format.as_mut(), decoder.as_mut(), track_id, |decoded| {
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        let samples = buf.samples();

        // Mix to mono
        if channels > 1 {
            #[allow(clippy::cast_precision_loss)]
            let n = channels as f32;
            mono.extend(samples.chunks(channels).map(|frame| frame.iter().sum::<f32>() / n));
        } else {
            mono.extend_from_slice(samples);
        }
    })?;

    if source_rate != TARGET_SAMPLE_RATE && !mono.is_empty() {
        debug!(source_rate, channels, "resampling to {TARGET_SAMPLE_RATE} Hz");
        mono = resample(&mono, source_rate, TARGET_SAMPLE_RATE)?;
    }

    Ok(AudioSignal::new(mono, TARGET_SAMPLE_RATE))
}

/// Resample mono audio from `from_rate` to `to_rate` using rubato.
///
/// The output is aligned for the resampler's delay and trimmed to
/// `ceil(len * to_rate / from_rate)` samples.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, TranscriptionError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let chunk_size = 1024;

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1).malformed("resampler init")?;
    let delay = resampler.output_delay();

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(expected + delay + chunk_size);

    // One trailing chunk of silence flushes the delay line.
    let flush = vec![0.0f32; chunk_size];
    for chunk in samples.chunks(chunk_size).chain(std::iter::once(flush.as_slice())) {
        let mut padded = chunk.to_vec();
        padded.resize(chunk_size, 0.0);

        let resampled = resampler
            .process(&[padded], None)
            .malformed("resample")?;

        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
        if output.len() >= expected + delay {
            break;
        }
    }

    let start = delay.min(output.len());
    let end = (start + expected).min(output.len());
    Ok(output[start..end].to_vec())
}
