use std::path::Path;

use ffmpeg_next as ffmpeg;
use image::{GrayImage, RgbImage};
use rustfft::{FftPlanner, num_complex::Complex};

use crate::client::CompletionClient;
use crate::error::{KonspektError, Result};
use crate::relevance::{analyze_frame_relevance, retains_diagram};
use crate::transcript::timestamp_to_seconds;
use crate::types::{Diagram, DiagramReference};
use crate::usage::UsageAccumulator;

/// Candidate frames are scanned at `target - WINDOW ..= target + WINDOW`.
const FRAME_WINDOW: i64 = 3;

/// Packets to read after a seek before giving up on a candidate index.
const MAX_PACKETS_PER_SEEK: usize = 50;

/// A decoded frame with its frequency-domain score.
pub struct ScoredFrame {
    pub image: RgbImage,
    pub score: f64,
}

/// Mean of `20 * ln |F(u,v)|` over the 2-D FFT of the grayscale frame.
/// The zero-frequency-centering shift is a permutation of the bins and
/// leaves this mean unchanged, so the bins are averaged unshifted.
pub fn blur_score(gray: &GrayImage) -> f64 {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    if width == 0 || height == 0 {
        return f64::NEG_INFINITY;
    }

    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(width);
    let col_fft = planner.plan_fft_forward(height);

    let mut rows: Vec<Complex<f64>> = gray
        .pixels()
        .map(|p| Complex::new(p[0] as f64, 0.0))
        .collect();
    for row in rows.chunks_exact_mut(width) {
        row_fft.process(row);
    }

    let mut cols = vec![Complex::new(0.0, 0.0); width * height];
    for y in 0..height {
        for x in 0..width {
            cols[x * height + y] = rows[y * width + x];
        }
    }
    for col in cols.chunks_exact_mut(height) {
        col_fft.process(col);
    }

    let sum: f64 = cols.iter().map(|c| 20.0 * c.norm().ln()).sum();
    sum / (width * height) as f64
}

/// Scan the candidate window around `target`, scoring every frame the
/// reader can produce, and keep the one with the minimum score. The
/// minimum is intentional parity with the reference selection rule,
/// counter-intuitive as it reads for a sharpness proxy.
fn best_scored<F>(target: i64, mut read_frame: F) -> Option<ScoredFrame>
where
    F: FnMut(i64) -> Option<RgbImage>,
{
    let mut best: Option<ScoredFrame> = None;
    for offset in -FRAME_WINDOW..=FRAME_WINDOW {
        let Some(image) = read_frame(target + offset) else {
            continue;
        };
        let score = blur_score(&image::imageops::grayscale(&image));
        if best.as_ref().is_none_or(|b| score < b.score) {
            best = Some(ScoredFrame { image, score });
        }
    }
    best
}

/// One opened video file. Construction fails fatally when the container
/// or its video stream cannot be opened; per-frame decode failures are
/// soft and only shrink the candidate window.
pub struct VideoSource {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    fps: f64,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |reason: String| KonspektError::VideoOpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg::init().map_err(|e| open_err(e.to_string()))?;
        unsafe {
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_ERROR as i32);
        }

        let ictx = ffmpeg::format::input(&path).map_err(|e| open_err(e.to_string()))?;
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| open_err("no video stream".to_string()))?;
        let stream_index = stream.index();

        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            30.0
        };
        let tb = stream.time_base();
        let time_base = tb.numerator() as f64 / tb.denominator() as f64;

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_err(e.to_string()))?
            .decoder()
            .video()
            .map_err(|e| open_err(e.to_string()))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| open_err(e.to_string()))?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            fps,
        })
    }

    pub fn frame_rate(&self) -> f64 {
        self.fps
    }

    /// Best frame within the window around the timestamp, or `None`
    /// when no candidate decodes (the caller skips the reference).
    pub fn select_best_frame(&mut self, timestamp: &str) -> Option<ScoredFrame> {
        let seconds = match timestamp_to_seconds(timestamp) {
            Ok(seconds) => seconds,
            Err(err) => {
                tracing::warn!(timestamp, error = %err, "skipping unparseable timestamp");
                return None;
            }
        };
        let target = (self.fps * seconds as f64) as i64;
        let selected = best_scored(target, |index| self.read_frame_at(index));
        if selected.is_none() {
            tracing::warn!(timestamp, "no readable frame in candidate window");
        }
        selected
    }

    /// Seek to the given frame index and decode the first frame at or
    /// past it. Any failure along the way yields `None`.
    fn read_frame_at(&mut self, index: i64) -> Option<RgbImage> {
        if index < 0 {
            return None;
        }
        let target_time = index as f64 / self.fps;
        let position = (target_time * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
        self.ictx.seek(position, ..position).ok()?;
        self.decoder.flush();

        let half_frame = 0.5 / self.fps;
        let stream_index = self.stream_index;
        let time_base = self.time_base;
        let mut packets_read = 0usize;

        for (stream, packet) in self.ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            packets_read += 1;
            if packets_read > MAX_PACKETS_PER_SEEK {
                return None;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            let mut decoded = ffmpeg::frame::Video::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let frame_time = decoded
                    .timestamp()
                    .map(|ts| ts as f64 * time_base)
                    .unwrap_or(0.0);
                if frame_time + half_frame >= target_time {
                    let mut rgb = ffmpeg::frame::Video::empty();
                    if self.scaler.run(&decoded, &mut rgb).is_err() {
                        return None;
                    }
                    return frame_to_image(&rgb);
                }
            }
        }
        None
    }
}

/// Copy an RGB24 frame into an `RgbImage`, honoring the plane stride.
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Option<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut buffer = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let start = y * stride;
        let end = start + width * 3;
        if end > data.len() {
            return None;
        }
        buffer.extend_from_slice(&data[start..end]);
    }
    RgbImage::from_raw(width as u32, height as u32, buffer)
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgb8,
        )
        .map_err(|e| KonspektError::IoError(std::io::Error::other(e.to_string())))?;
    Ok(jpeg)
}

/// For each grouped reference, in order: pick the best frame (skip the
/// reference when none decodes), judge relevance, and persist the frame
/// as `HH_MM_SS.jpg` when it passes the filter. Output order follows
/// reference order.
pub async fn extract_diagrams(
    client: &dyn CompletionClient,
    video_path: &Path,
    references: &[DiagramReference],
    frames_dir: &Path,
    usage: &mut UsageAccumulator,
) -> Result<Vec<Diagram>> {
    std::fs::create_dir_all(frames_dir)?;
    if references.is_empty() {
        return Ok(Vec::new());
    }
    let mut video = VideoSource::open(video_path)?;
    tracing::debug!(fps = video.frame_rate(), "video opened");

    collect_diagrams(client, references, frames_dir, usage, |timestamp| {
        video.select_best_frame(timestamp)
    })
    .await
}

/// The acceptance loop, generic over where candidate frames come from
/// so it can be driven without a decoder.
async fn collect_diagrams<F>(
    client: &dyn CompletionClient,
    references: &[DiagramReference],
    frames_dir: &Path,
    usage: &mut UsageAccumulator,
    mut select_frame: F,
) -> Result<Vec<Diagram>>
where
    F: FnMut(&str) -> Option<ScoredFrame>,
{
    let mut diagrams = Vec::new();
    for reference in references {
        tracing::info!(timestamp = %reference.timestamp, "processing diagram reference");
        let Some(frame) = select_frame(&reference.timestamp) else {
            continue;
        };

        let jpeg = encode_jpeg(&frame.image)?;
        let analysis = analyze_frame_relevance(client, &jpeg, usage)
            .await
            .into_value();
        if !retains_diagram(&analysis) {
            continue;
        }

        let filename = format!("{}.jpg", reference.timestamp.replace(':', "_"));
        let path = frames_dir.join(filename);
        std::fs::write(&path, &jpeg)?;
        diagrams.push(Diagram {
            timestamp: reference.timestamp.clone(),
            path,
            description: analysis.reason,
            relevance: analysis.score,
        });
    }

    tracing::info!(count = diagrams.len(), "extracted relevant diagrams");
    Ok(diagrams)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::client::Completion;
    use crate::usage::TokenUsage;

    fn flat_image(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb([value, value, value]))
    }

    /// Vision-only stub: hands out scripted verdicts in call order.
    #[derive(Default)]
    struct StubVision {
        verdicts: Mutex<VecDeque<String>>,
    }

    impl StubVision {
        fn push(&self, verdict: &str) {
            self.verdicts.lock().unwrap().push_back(verdict.to_string());
        }
    }

    #[async_trait]
    impl CompletionClient for StubVision {
        async fn complete_text(&self, _system: &str, _user: &str) -> Result<Completion> {
            panic!("no text completion expected");
        }

        async fn complete_vision(&self, _prompt: &str, _jpeg: &[u8]) -> Result<Completion> {
            let text = self
                .verdicts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected vision call");
            Ok(Completion {
                text,
                usage: TokenUsage::new(5, 5),
            })
        }

        async fn complete_structured(
            &self,
            _system: &str,
            _user: &str,
            _schema: serde_json::Value,
        ) -> Result<Completion> {
            panic!("no structured completion expected");
        }
    }

    fn reference(timestamp: &str) -> DiagramReference {
        DiagramReference {
            timestamp: timestamp.to_string(),
            context: "a diagram".to_string(),
        }
    }

    #[tokio::test]
    async fn acceptance_loop_filters_names_and_orders_diagrams() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("Frames");
        std::fs::create_dir_all(&frames_dir).unwrap();

        let client = StubVision::default();
        // One verdict per reference that yields a frame (all but the
        // first): accepted, rejected at the boundary, accepted.
        client.push(r#"{"relevant": true, "score": 0.9, "reason": "phase chart"}"#);
        client.push(r#"{"relevant": true, "score": 0.6, "reason": "boundary"}"#);
        client.push(r#"{"relevant": true, "score": 0.95, "reason": "spindle sketch"}"#);

        let references = vec![
            reference("00:00:01"),
            reference("00:00:10"),
            reference("00:00:20"),
            reference("00:00:30"),
        ];

        let mut usage = UsageAccumulator::new();
        let diagrams = collect_diagrams(&client, &references, &frames_dir, &mut usage, |ts| {
            // No decodable frame at the first reference.
            (ts != "00:00:01").then(|| ScoredFrame {
                image: flat_image(4, 4, 80),
                score: 0.0,
            })
        })
        .await
        .unwrap();

        // Reference order is preserved; the undecodable reference and
        // the boundary score are both dropped.
        let timestamps: Vec<&str> = diagrams.iter().map(|d| d.timestamp.as_str()).collect();
        assert_eq!(timestamps, ["00:00:10", "00:00:30"]);
        assert_eq!(diagrams[0].description, "phase chart");
        assert_eq!(diagrams[0].relevance, 0.9);

        // Frames persist under the timestamp-derived filename.
        assert_eq!(diagrams[0].path, frames_dir.join("00_00_10.jpg"));
        assert_eq!(diagrams[1].path, frames_dir.join("00_00_30.jpg"));
        for diagram in &diagrams {
            assert!(diagram.path.exists());
        }
        assert!(!frames_dir.join("00_00_01.jpg").exists());
        assert!(!frames_dir.join("00_00_20.jpg").exists());
    }

    #[tokio::test]
    async fn unparseable_verdict_drops_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let client = StubVision::default();
        client.push("not a json verdict");

        let mut usage = UsageAccumulator::new();
        let diagrams = collect_diagrams(
            &client,
            &[reference("00:01:00")],
            dir.path(),
            &mut usage,
            |_| {
                Some(ScoredFrame {
                    image: flat_image(4, 4, 80),
                    score: 0.0,
                })
            },
        )
        .await
        .unwrap();

        assert!(diagrams.is_empty());
        assert!(!dir.path().join("00_01_00.jpg").exists());
    }

    #[test]
    fn blur_score_matches_hand_computed_dft() {
        // 2x2 grayscale [[10, 3], [5, 1]]: DFT bins are 19, 11, 7, 3.
        let mut gray = GrayImage::new(2, 2);
        gray.put_pixel(0, 0, image::Luma([10]));
        gray.put_pixel(1, 0, image::Luma([3]));
        gray.put_pixel(0, 1, image::Luma([5]));
        gray.put_pixel(1, 1, image::Luma([1]));

        let expected =
            20.0 * (19f64.ln() + 11f64.ln() + 7f64.ln() + 3f64.ln()) / 4.0;
        let score = blur_score(&gray);
        assert!((score - expected).abs() < 1e-9, "got {score}, want {expected}");
    }

    #[test]
    fn flat_frame_scores_negative_infinity() {
        // All energy sits in the DC bin; every other magnitude is zero
        // and ln(0) drags the mean to -inf, exactly as the reference
        // scoring does.
        let gray = GrayImage::from_pixel(4, 4, image::Luma([128]));
        assert_eq!(blur_score(&gray), f64::NEG_INFINITY);
    }

    #[test]
    fn window_evaluates_at_most_seven_candidates() {
        let mut evaluated = Vec::new();
        let selected = best_scored(100, |index| {
            evaluated.push(index);
            Some(flat_image(4, 4, (index % 255) as u8))
        });
        assert!(selected.is_some());
        assert_eq!(evaluated, vec![97, 98, 99, 100, 101, 102, 103]);
    }

    #[test]
    fn undecodable_candidates_are_skipped() {
        let mut asked = 0;
        let selected = best_scored(10, |index| {
            asked += 1;
            // Only one candidate in the window decodes.
            (index == 12).then(|| flat_image(4, 4, 50))
        });
        assert_eq!(asked, 7);
        assert!(selected.is_some());
    }

    #[test]
    fn all_candidates_unreadable_yields_none() {
        let selected = best_scored(10, |_| None);
        assert!(selected.is_none());
    }

    #[test]
    fn minimum_score_wins() {
        // A flat frame scores -inf, which beats a textured frame with
        // all-nonzero DFT bins under the minimum-score rule.
        let mut textured = RgbImage::new(2, 2);
        textured.put_pixel(0, 0, image::Rgb([10, 10, 10]));
        textured.put_pixel(1, 0, image::Rgb([3, 3, 3]));
        textured.put_pixel(0, 1, image::Rgb([5, 5, 5]));
        textured.put_pixel(1, 1, image::Rgb([1, 1, 1]));
        let flat = flat_image(2, 2, 200);

        let selected = best_scored(1, |index| match index {
            0 => Some(textured.clone()),
            1 => Some(flat.clone()),
            _ => None,
        })
        .unwrap();
        assert_eq!(selected.score, f64::NEG_INFINITY);
        assert_eq!(selected.image.get_pixel(0, 0), flat.get_pixel(0, 0));
    }

    #[test]
    fn jpeg_encoding_round_trips_dimensions() {
        let image = flat_image(8, 6, 90);
        let jpeg = encode_jpeg(&image).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 6);
    }
}
