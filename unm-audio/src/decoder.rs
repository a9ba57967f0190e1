use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::{AudioBufferRef, Signal},
    codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions},
    conv::FromSample,
    errors::Error,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    units::{Time, TimeBase},
};

use crate::clip::{SampleBuffer, WaveFormat};
use crate::error::DecodeError;

/// 把解码结果追加为交错采样，超过两个声道时下混为立体声
macro_rules! fill_interleaved {
    ($audio_buf:expr, $out_data:expr) => {{
        let frames = $audio_buf.frames();
        let chan_count = $audio_buf.spec().channels.count();

        match chan_count {
            0 => {}
            1 | 2 => {
                for i in 0..frames {
                    for c in 0..chan_count {
                        $out_data.push(f32::from_sample($audio_buf.chan(c)[i]));
                    }
                }
            }
            _ => {
                // 额外声道各以一半权重叠加到左右声道
                let norm = 1.0 / (1.0 + 0.5 * (chan_count - 2) as f32);
                for i in 0..frames {
                    let mut l = f32::from_sample($audio_buf.chan(0)[i]);
                    let mut r = f32::from_sample($audio_buf.chan(1)[i]);
                    for c in 2..chan_count {
                        let v = f32::from_sample($audio_buf.chan(c)[i]);
                        l += v * 0.5;
                        r += v * 0.5;
                    }
                    $out_data.push((l * norm).clamp(-1.0, 1.0));
                    $out_data.push((r * norm).clamp(-1.0, 1.0));
                }
            }
        }
    }};
}

fn append_interleaved(decoded: AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::U8(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::U16(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::U24(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::U32(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::S8(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::S16(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::S24(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::S32(buf) => fill_interleaved!(buf, out),
        AudioBufferRef::F64(buf) => fill_interleaved!(buf, out),
    }
}

/// 把音效文件完整解码为内存中的采样
pub trait StreamDecoder: Send {
    fn decode(&self, path: &Path) -> Result<SampleBuffer, DecodeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl StreamDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<SampleBuffer, DecodeError> {
        let mut reader = TrackReader::open(path)?;
        let mut samples = Vec::new();
        while reader.next_chunk(&mut samples)? {}

        Ok(SampleBuffer::new(
            samples,
            WaveFormat::float32(reader.sample_rate(), reader.channels()),
        ))
    }
}

/// 按包顺序读取单条音轨，音乐流和音效解码共用
pub(crate) struct TrackReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    channels: u16,
    duration: Option<f64>,
}

impl TrackReader {
    pub(crate) fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
            .ok_or(DecodeError::NoTrack)?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let sample_rate = track.codec_params.sample_rate.unwrap_or(48000);
        let source_channels = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(2);
        if source_channels == 0 {
            return Err(DecodeError::Unsupported("track has no channels".into()));
        }

        let duration = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        Ok(Self {
            track_id: track.id,
            time_base: track.codec_params.time_base,
            duration,
            format,
            decoder,
            sample_rate,
            channels: source_channels.min(2) as u16,
        })
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 输出声道数（1 或 2）
    pub(crate) fn channels(&self) -> u16 {
        self.channels
    }

    /// 容器记录了总帧数时可知
    pub(crate) fn duration_secs(&self) -> Option<f64> {
        self.duration
    }

    /// 解码下一个包并追加到 `out`。读到文件末尾返回 `Ok(false)`。
    pub(crate) fn next_chunk(&mut self, out: &mut Vec<f32>) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(err) => return Err(err.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    append_interleaved(decoded, out);
                    return Ok(true);
                }
                // 单个坏包直接跳过
                Err(Error::DecodeError(_)) => continue,
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// 返回实际定位到的时间（秒）
    pub(crate) fn seek(&mut self, seconds: f64) -> Result<f64, DecodeError> {
        let seconds = seconds.max(0.0);
        let time = Time::new(seconds.trunc() as u64, seconds.fract());

        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();

        Ok(match self.time_base {
            Some(tb) => {
                let actual = tb.calc_time(seeked.actual_ts);
                actual.seconds as f64 + actual.frac
            }
            None => seconds,
        })
    }
}
