//! Clip decoding to mono 16-bit PCM.

use std::io::Cursor;

use crate::config::AudioFormat;
use crate::error::SpeakerError;

/// Decoded mono clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

pub fn decode(data: &[u8], format: AudioFormat) -> Result<PcmClip, SpeakerError> {
    let clip = match format {
        AudioFormat::Mp3 => decode_mp3(data)?,
        AudioFormat::Wav => decode_wav(data)?,
        AudioFormat::Pcm16k => decode_pcm(data, 16000),
        AudioFormat::Pcm8k => decode_pcm(data, 8000),
    };
    if clip.samples.is_empty() {
        return Err(SpeakerError::Decode("clip contains no samples".to_string()));
    }
    Ok(clip)
}

fn decode_mp3(data: &[u8]) -> Result<PcmClip, SpeakerError> {
    use minimp3::{Decoder, Frame};

    let mut decoder = Decoder::new(Cursor::new(data));
    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = 16000u32;

    loop {
        match decoder.next_frame() {
            Ok(Frame {
                data,
                sample_rate: rate,
                channels,
                ..
            }) => {
                sample_rate = rate as u32;
                samples.extend(downmix(&data, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) if samples.is_empty() => {
                return Err(SpeakerError::Decode(format!("mp3: {e:?}")));
            }
            // Truncated tail, keep what decoded
            Err(_) => break,
        }
    }

    Ok(PcmClip {
        samples,
        sample_rate,
    })
}

fn decode_wav(data: &[u8]) -> Result<PcmClip, SpeakerError> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| SpeakerError::Decode(format!("wav: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| scale_to_i16(s, bits)))
                .collect::<Result<Vec<i16>, _>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect::<Result<Vec<i16>, _>>(),
    }
    .map_err(|e| SpeakerError::Decode(format!("wav: {e}")))?;

    Ok(PcmClip {
        samples: downmix(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

/// Raw little-endian 16-bit mono, as the service sends for pcm formats
fn decode_pcm(data: &[u8], sample_rate: u32) -> PcmClip {
    let samples = data
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    PcmClip {
        samples,
        sample_rate,
    }
}

fn scale_to_i16(sample: i32, bits: u16) -> i16 {
    if bits > 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}

fn downmix(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Simple linear resampling (good enough for speech)
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let s1 = samples.get(src_idx).copied().unwrap_or(0);
        let s2 = samples.get(src_idx + 1).copied().unwrap_or(s1);

        let interpolated = s1 as f64 * (1.0 - frac) + s2 as f64 * frac;
        output.push(interpolated as i16);
    }

    output
}
