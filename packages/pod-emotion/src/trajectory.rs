//! The bot's recent emotional trajectory, computed from the time-series
//! store with a vector-store fallback.

use chrono::{Duration, Utc};
use std::sync::Arc;
use sylph_core::{
    EmotionLabel, EmotionSample, EmotionalTrajectory, MetricsStore, PointFilter,
    TrajectoryDirection, VectorStore,
};
use tracing::{debug, warn};

/// Intensity slope beyond which the trend stops reading as stable
const SLOPE_THRESHOLD: f32 = 0.05;

/// Window of bot responses considered
const WINDOW_HOURS: i64 = 24;

/// Most recent emotions carried into the prompt
const RECENT_LIMIT: usize = 10;

/// Trajectory analyzer for one character instance
pub struct TrajectoryAnalyzer {
    metrics: Arc<dyn MetricsStore>,
    vectors: Arc<dyn VectorStore>,
}

impl TrajectoryAnalyzer {
    pub fn new(metrics: Arc<dyn MetricsStore>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { metrics, vectors }
    }

    /// Compute the trajectory for a pair, or None when there is no usable
    /// bot-emotion history anywhere.
    pub async fn analyze(
        &self,
        collection: &str,
        character_id: &str,
        user_id: &str,
    ) -> Option<EmotionalTrajectory> {
        let since = Utc::now() - Duration::hours(WINDOW_HOURS);

        let samples = match self
            .metrics
            .bot_emotion_series(character_id, user_id, since)
            .await
        {
            Ok(samples) if !samples.is_empty() => samples,
            Ok(_) => {
                debug!("No bot emotion points in window, falling back to stored memories");
                self.fallback_samples(collection, user_id).await
            }
            Err(e) => {
                warn!("Time-series read failed, falling back to stored memories: {}", e);
                self.fallback_samples(collection, user_id).await
            }
        };

        if samples.is_empty() {
            return None;
        }
        Some(Self::from_samples(&samples))
    }

    /// Reconstruct samples from the bot-emotion payloads of recent memories
    async fn fallback_samples(&self, collection: &str, user_id: &str) -> Vec<EmotionSample> {
        let records = match self
            .vectors
            .scroll(collection, &PointFilter::for_user(user_id), RECENT_LIMIT)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!("Fallback scroll failed: {}", e);
                return Vec::new();
            }
        };

        let mut samples: Vec<EmotionSample> = records
            .into_iter()
            .filter_map(|record| {
                let emotion = record.bot_emotion?;
                Some(EmotionSample {
                    emotion: emotion.primary_emotion,
                    intensity: emotion.emotional_intensity,
                    timestamp: record.timestamp,
                })
            })
            .collect();
        samples.sort_by_key(|sample| sample.timestamp);
        samples
    }

    /// Least-squares slope of intensity over the ordered sample sequence
    fn intensity_slope(samples: &[EmotionSample]) -> f32 {
        let n = samples.len();
        if n < 2 {
            return 0.0;
        }

        let mean_x = (n - 1) as f32 / 2.0;
        let mean_y = samples.iter().map(|s| s.intensity).sum::<f32>() / n as f32;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, sample) in samples.iter().enumerate() {
            let dx = i as f32 - mean_x;
            numerator += dx * (sample.intensity - mean_y);
            denominator += dx * dx;
        }
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    fn from_samples(samples: &[EmotionSample]) -> EmotionalTrajectory {
        let slope = Self::intensity_slope(samples);
        let direction = if slope > SLOPE_THRESHOLD {
            TrajectoryDirection::Intensifying
        } else if slope < -SLOPE_THRESHOLD {
            TrajectoryDirection::Calming
        } else {
            TrajectoryDirection::Stable
        };

        let latest = samples.last().expect("non-empty sample window");
        let recent: Vec<EmotionLabel> = samples
            .iter()
            .rev()
            .take(RECENT_LIMIT)
            .map(|sample| sample.emotion)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let mut distinct: Vec<EmotionLabel> = Vec::new();
        for sample in samples {
            if !distinct.contains(&sample.emotion) {
                distinct.push(sample.emotion);
            }
        }

        EmotionalTrajectory {
            current_emotion: latest.emotion,
            intensity: latest.intensity,
            direction,
            recent_emotions: recent,
            distinct_emotions: distinct.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn samples(intensities: &[f32]) -> Vec<EmotionSample> {
        let base: DateTime<Utc> = Utc::now() - Duration::hours(12);
        intensities
            .iter()
            .enumerate()
            .map(|(i, &intensity)| EmotionSample {
                emotion: if i % 2 == 0 {
                    EmotionLabel::Joy
                } else {
                    EmotionLabel::Excitement
                },
                intensity,
                timestamp: base + Duration::minutes(i as i64 * 10),
            })
            .collect()
    }

    #[test]
    fn test_rising_intensity_reads_as_intensifying() {
        let trajectory = TrajectoryAnalyzer::from_samples(&samples(&[0.1, 0.3, 0.5, 0.7, 0.9]));
        assert_eq!(trajectory.direction, TrajectoryDirection::Intensifying);
        assert_eq!(trajectory.current_emotion, EmotionLabel::Joy);
        assert_eq!(trajectory.distinct_emotions, 2);
    }

    #[test]
    fn test_falling_intensity_reads_as_calming() {
        let trajectory = TrajectoryAnalyzer::from_samples(&samples(&[0.9, 0.7, 0.5, 0.3, 0.1]));
        assert_eq!(trajectory.direction, TrajectoryDirection::Calming);
    }

    #[test]
    fn test_flat_intensity_reads_as_stable() {
        let trajectory = TrajectoryAnalyzer::from_samples(&samples(&[0.5, 0.52, 0.49, 0.5]));
        assert_eq!(trajectory.direction, TrajectoryDirection::Stable);
    }

    #[test]
    fn test_single_sample_is_stable() {
        let trajectory = TrajectoryAnalyzer::from_samples(&samples(&[0.8]));
        assert_eq!(trajectory.direction, TrajectoryDirection::Stable);
        assert!((trajectory.intensity - 0.8).abs() < 1e-6);
    }
}
