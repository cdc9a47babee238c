use serde::Serialize;
use tracing::debug;

use crate::pipeline::payload::{ImageMime, ImagePayload};
use crate::pipeline::transform::encode_with_quality;
use crate::pipeline::PipelineError;

pub const INITIAL_QUALITY: f32 = 0.95;
pub const QUALITY_DECAY: f32 = 0.85;
pub const MAX_ROUNDS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionAttempt {
    pub quality: f32,
    pub byte_len: usize,
}

#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub payload: ImagePayload,
    pub attempts: Vec<CompressionAttempt>,
    pub target_bytes: usize,
    pub target_met: bool,
}

impl CompressionOutcome {
    pub fn final_quality(&self) -> Option<f32> {
        self.attempts.last().map(|attempt| attempt.quality)
    }
}

/// Best-effort JPEG compression towards `target_kb`.
///
/// Lowers the quality geometrically until an encoding fits or the round budget runs
/// out. The last attempt is returned either way; `target_met` says which.
pub fn compress_to_size(
    source: &ImagePayload,
    target_kb: u32,
) -> Result<CompressionOutcome, PipelineError> {
    if target_kb == 0 {
        return Err(PipelineError::InvalidParameter(String::from(
            "target size must be at least 1 KB",
        )));
    }
    let target_bytes = target_kb as usize * 1024;
    let image = source.decode()?;

    let mut quality = INITIAL_QUALITY;
    let mut attempts = Vec::with_capacity(MAX_ROUNDS);
    let mut last = None;
    for _ in 0..MAX_ROUNDS {
        let encoded = encode_with_quality(&image, ImageMime::Jpeg, quality)?;
        attempts.push(CompressionAttempt {
            quality,
            byte_len: encoded.len(),
        });
        let fits = encoded.len() <= target_bytes;
        last = Some(encoded);
        if fits {
            break;
        }
        quality *= QUALITY_DECAY;
    }

    let Some(payload) = last else {
        return Err(PipelineError::InvalidParameter(String::from(
            "compression produced no output",
        )));
    };
    let target_met = payload.len() <= target_bytes;
    debug!(
        rounds = attempts.len(),
        byte_len = payload.len(),
        target_bytes,
        target_met,
        "compression finished"
    );
    Ok(CompressionOutcome {
        payload,
        attempts,
        target_bytes,
        target_met,
    })
}
