//! Symphonia-backed `PcmSource`.
//!
//! Probes the container with an extension hint, decodes packet by packet, and
//! converts every native sample format to interleaved f32 through Symphonia's
//! `SampleBuffer`. An unexpected EOF from the demuxer is end-of-stream, not
//! an error.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::session::{DecodeError, PcmSource, SourceSpec};

/// Streaming decoder yielding interleaved `f32` frames from a media file.
pub struct SymphoniaSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Decoded samples not yet handed to the caller.
    pending: Vec<f32>,
    pending_pos: usize,
    spec: SourceSpec,
    finished: bool,
}

impl std::fmt::Debug for SymphoniaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymphoniaSource")
            .field("track_id", &self.track_id)
            .field("pending_pos", &self.pending_pos)
            .field("spec", &self.spec)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl SymphoniaSource {
    /// Open a local media file, using its extension as the probe hint.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }
        Self::from_stream(mss, hint)
    }

    fn from_stream(mss: MediaSourceStream, hint: Hint) -> Result<Self, DecodeError> {
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| DecodeError::Init {
                message: format!("probe failed: {err}"),
            })?;
        let reader = probed.format;
        let track = reader.default_track().ok_or_else(|| DecodeError::Init {
            message: "no default audio track".to_string(),
        })?;
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|err| DecodeError::Init {
                message: format!("decoder creation failed: {err}"),
            })?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| DecodeError::Init {
            message: "missing sample rate".to_string(),
        })?;
        let channels = track
            .codec_params
            .channels
            .map(|channels| channels.count() as u16)
            .ok_or_else(|| DecodeError::Init {
                message: "missing channel layout".to_string(),
            })?;
        // Headerless streams carry no frame count; 0.0 marks the duration as
        // unknown.
        let duration_seconds = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / f64::from(sample_rate))
            .unwrap_or(0.0);

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            spec: SourceSpec {
                sample_rate,
                channels,
                duration_seconds,
            },
            finished: false,
        })
    }

    /// Decode packets until some interleaved samples are pending or the
    /// stream ends.
    fn refill(&mut self) -> Result<(), DecodeError> {
        while !self.finished && self.pending_pos >= self.pending.len() {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(ref err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    return Ok(());
                }
                Err(err) => {
                    self.finished = true;
                    return Err(DecodeError::Read {
                        message: format!("demux failed: {err}"),
                    });
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(err)) => {
                    // Recoverable corruption: skip the packet.
                    tracing::warn!("Skipping undecodable packet: {err}");
                    continue;
                }
                Err(err) => {
                    self.finished = true;
                    return Err(DecodeError::Read {
                        message: format!("decode failed: {err}"),
                    });
                }
            };
            let buf = self.sample_buf.get_or_insert_with(|| {
                SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
            });
            buf.copy_interleaved_ref(decoded);
            self.pending.clear();
            self.pending.extend_from_slice(buf.samples());
            self.pending_pos = 0;
        }
        Ok(())
    }
}

impl PcmSource for SymphoniaSource {
    fn spec(&self) -> SourceSpec {
        self.spec
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let channels = self.spec.channels as usize;
        let capacity_frames = out.len() / channels;
        let mut written_frames = 0usize;
        while written_frames < capacity_frames {
            if self.pending_pos >= self.pending.len() {
                self.refill()?;
                if self.pending_pos >= self.pending.len() {
                    break;
                }
            }
            let available_frames = (self.pending.len() - self.pending_pos) / channels;
            let take = available_frames.min(capacity_frames - written_frames);
            if take == 0 {
                // A trailing partial frame in the packet; drop it.
                self.pending_pos = self.pending.len();
                continue;
            }
            let src = &self.pending[self.pending_pos..self.pending_pos + take * channels];
            out[written_frames * channels..(written_frames + take) * channels]
                .copy_from_slice(src);
            self.pending_pos += take * channels;
            written_frames += take;
        }
        Ok(written_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for frame in 0..frames {
            let phase = frame as f32 / sample_rate as f32;
            let value = (phase * 440.0 * std::f32::consts::TAU).sin() * 0.5;
            let scaled = (value * f32::from(i16::MAX)) as i16;
            for _ in 0..channels {
                writer.write_sample(scaled).expect("write sample");
            }
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn opens_wav_and_reports_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 2, 8_000, 8_000);
        let source = SymphoniaSource::open(&path).expect("open wav");
        let spec = source.spec();
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(spec.channels, 2);
        assert!((spec.duration_seconds - 1.0).abs() < 0.01);
    }

    #[test]
    fn reads_all_frames_then_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let frames = 4_096usize;
        write_wav(&path, 1, 8_000, frames);
        let mut source = SymphoniaSource::open(&path).expect("open wav");
        let mut chunk = vec![0.0_f32; 512];
        let mut total = 0usize;
        loop {
            let read = source.read(&mut chunk).expect("read frames");
            if read == 0 {
                break;
            }
            total += read;
            assert!(chunk[..read].iter().all(|sample| sample.abs() <= 1.0));
        }
        assert_eq!(total, frames);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = SymphoniaSource::open(Path::new("/nonexistent/file.wav"))
            .expect_err("must fail");
        assert!(matches!(err, DecodeError::Open { .. }));
    }

    #[test]
    fn garbage_bytes_are_an_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not actually audio data at all").unwrap();
        let err = SymphoniaSource::open(&path).expect_err("must fail");
        assert!(matches!(err, DecodeError::Init { .. }));
    }
}
