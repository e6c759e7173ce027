use crate::audio::error::AudioError;
use std::fs::File;
use std::io;
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace, warn};

const LOG_TARGET: &str = "r_alertsound::audio::decoder";

/// Result of decoding one packet.
pub enum DecodeResult {
    /// Interleaved S16 samples for one packet.
    Decoded(Vec<i16>),
    EndOfStream,
}

/// Decodes an alert file into S16 interleaved samples, one packet at a time.
/// Runs on a blocking thread; never call from async code directly.
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: SignalSpec,
    sample_buf: Option<SampleBuffer<i16>>,
}

impl SymphoniaDecoder {
    /// Opens the file at `path` and detects its container format.
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::UnsupportedFormat("No suitable audio track found".to_string()))?
            .clone();

        let decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let spec = SignalSpec::new(
            track.codec_params.sample_rate.ok_or(AudioError::MissingCodecParams("sample rate"))?,
            track.codec_params.channels.ok_or(AudioError::MissingCodecParams("channels map"))?,
        );
        debug!(target: LOG_TARGET, path = %path.display(), "Decoder ready. Spec: {:?}", spec);

        Ok(Self {
            format_reader,
            decoder,
            track_id: track.id,
            spec,
            sample_buf: None,
        })
    }

    pub fn spec(&self) -> SignalSpec {
        self.spec
    }

    pub fn channels(&self) -> usize {
        self.spec.channels.count()
    }

    /// Decodes the next packet of the selected track.
    pub fn decode_next(&mut self) -> Result<DecodeResult, AudioError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    trace!(target: LOG_TARGET, "End of stream reached.");
                    return Ok(DecodeResult::EndOfStream);
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.spec() != &self.spec {
                        return Err(AudioError::UnsupportedFormat("Dynamic spec change".to_string()));
                    }
                    let sample_buf = self
                        .sample_buf
                        .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
                    if sample_buf.capacity() < decoded.frames() * self.spec.channels.count() {
                        *sample_buf = SampleBuffer::new(decoded.capacity() as u64, *decoded.spec());
                    }
                    sample_buf.copy_interleaved_ref(decoded);
                    return Ok(DecodeResult::Decoded(sample_buf.samples().to_vec()));
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    warn!(target: LOG_TARGET, "Symphonia decode error (skipping packet): {}", err);
                }
                Err(e) => return Err(AudioError::DecodingError(e.to_string())),
            }
        }
    }
}
