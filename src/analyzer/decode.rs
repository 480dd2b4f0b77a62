use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;
use std::process::Command;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("symphonia decode error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("no decodable audio track")]
    NoAudioTrack,
    #[error("stream decoded to zero samples")]
    Empty,
    #[error("resampling error: {0}")]
    Resample(String),
    #[error("ffmpeg not found (required for WMA files)")]
    FfmpegNotFound,
    #[error("ffmpeg decode error: {0}")]
    Ffmpeg(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono samples at a known rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Turns an audio file into mono samples at (ideally) the requested rate.
///
/// Implementations must be shareable across decode workers.
pub trait Decoder: Sync {
    fn decode(&self, path: &Path, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError>;
}

/// Default decoder: symphonia for every format it knows, ffmpeg for WMA.
/// Output is downmixed to mono and resampled to the target rate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl Decoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
        load_audio(path, target_sample_rate)
    }
}

/// Load an audio file, using symphonia for standard formats
/// and an ffmpeg subprocess for WMA.
pub fn load_audio(path: &Path, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let audio = if ext == "wma" {
        load_wma_via_ffmpeg(path)?
    } else {
        decode_mono(path)?
    };

    if audio.samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    if audio.sample_rate == target_sample_rate {
        return Ok(audio);
    }

    log::trace!(
        "Resampling {} from {} Hz to {} Hz",
        path.display(),
        audio.sample_rate,
        target_sample_rate
    );
    let samples = resample(&audio.samples, audio.sample_rate, target_sample_rate)?;
    Ok(DecodedAudio {
        samples,
        sample_rate: target_sample_rate,
    })
}

/// Decode every packet of the first audio track and average channels to mono.
fn decode_mono(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or(DecodeError::NoAudioTrack)?
        .clone();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            // End of stream
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(audio) => audio,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::trace!("Skipping corrupt packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        sample_rate = spec.rate;

        let mut sb = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sb.copy_interleaved_ref(decoded);

        for frame in sb.samples().chunks_exact(channels) {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    if sample_rate == 0 {
        return Err(DecodeError::NoAudioTrack);
    }

    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
    })
}

/// Band-limited sinc resampling of a mono signal. The output has
/// `round(len * dst / src)` samples and starts at the same instant as the
/// input; `SincFixedIn` output needs no delay compensation.
pub fn resample(samples: &[f32], src_sr: u32, dst_sr: u32) -> Result<Vec<f32>, DecodeError> {
    if src_sr == dst_sr || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if src_sr == 0 || dst_sr == 0 {
        return Err(DecodeError::Resample(format!(
            "cannot resample {} Hz -> {} Hz",
            src_sr, dst_sr
        )));
    }

    let ratio = dst_sr as f64 / src_sr as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let chunk_size = 1024usize;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_size, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let mut output: Vec<f32> = Vec::with_capacity(expected + chunk_size);
    let mut offset = 0usize;

    // Zero padding past the end flushes the filter tail.
    while output.len() < expected {
        let mut chunk = vec![0.0f32; chunk_size];
        if offset < samples.len() {
            let end = (offset + chunk_size).min(samples.len());
            chunk[..end - offset].copy_from_slice(&samples[offset..end]);
        }
        offset += chunk_size;

        let out = resampler
            .process(&[chunk], None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    output.truncate(expected);
    Ok(output)
}

/// Decode a .wma file by shelling out to ffmpeg and converting to WAV in a temp file.
fn load_wma_via_ffmpeg(path: &Path) -> Result<DecodedAudio, DecodeError> {
    // Check ffmpeg is available
    let ffmpeg_check = Command::new("ffmpeg").arg("-version").output();
    if ffmpeg_check.is_err() {
        return Err(DecodeError::FfmpegNotFound);
    }

    // Removed when dropped, whatever happens below
    let tmp_wav = tempfile::Builder::new()
        .prefix("mirset_wma_")
        .suffix(".wav")
        .tempfile()?;

    let output = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-i",
            &path.to_string_lossy(),
            "-f",
            "wav",
            "-acodec",
            "pcm_s16le",
            "-y",
            &tmp_wav.path().to_string_lossy(),
        ])
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DecodeError::Ffmpeg(stderr.trim().to_string()));
    }

    decode_mono(tmp_wav.path())
}
