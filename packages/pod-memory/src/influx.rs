//! InfluxDB v2 metrics store: line-protocol writes plus the single Flux
//! read that feeds the trajectory analyzer.
//!
//! Writes are fire-and-forget from the pipeline's perspective; a dropped
//! point costs one analytics sample, never a turn.

use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sylph_core::{EmotionLabel, EmotionSample, MetricPoint, MetricsStore};
use tracing::{debug, warn};

/// Metrics client for an InfluxDB v2 instance
pub struct InfluxMetricsStore {
    client: Client,
    base_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxMetricsStore {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            org: org.into(),
            bucket: bucket.into(),
            token: token.into(),
        }
    }

    /// Liveness probe used at startup
    pub async fn health_check(&self) -> MemoryResult<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Escape measurement/tag content per the line protocol rules
    fn escape_tag(value: &str) -> String {
        value
            .replace('\\', "\\\\")
            .replace(',', "\\,")
            .replace('=', "\\=")
            .replace(' ', "\\ ")
    }

    fn to_line_protocol(point: &MetricPoint) -> String {
        let mut line = String::from(point.measurement);
        for (key, value) in &point.tags {
            line.push(',');
            line.push_str(key);
            line.push('=');
            line.push_str(&Self::escape_tag(value));
        }
        line.push(' ');
        let fields: Vec<String> = point
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(
            &point
                .timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string(),
        );
        line
    }

    /// Parse the annotated CSV a Flux query returns into emotion samples.
    ///
    /// Expects `_time`, `_value`, and `emotion` columns; rows that do not
    /// parse are skipped.
    fn parse_series_csv(body: &str) -> Vec<EmotionSample> {
        let mut samples = Vec::new();
        let mut time_idx = None;
        let mut value_idx = None;
        let mut emotion_idx = None;

        for line in body.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let columns: Vec<&str> = line.split(',').map(str::trim).collect();
            if time_idx.is_none() {
                // First unannotated line is the header
                for (idx, name) in columns.iter().enumerate() {
                    match *name {
                        "_time" => time_idx = Some(idx),
                        "_value" => value_idx = Some(idx),
                        "emotion" => emotion_idx = Some(idx),
                        _ => {}
                    }
                }
                continue;
            }

            let (Some(ti), Some(vi)) = (time_idx, value_idx) else {
                break;
            };
            let Some(raw_time) = columns.get(ti) else {
                continue;
            };
            let Some(raw_value) = columns.get(vi) else {
                continue;
            };
            let Ok(timestamp) = raw_time.parse::<DateTime<Utc>>() else {
                continue;
            };
            let Ok(intensity) = raw_value.parse::<f32>() else {
                continue;
            };
            let emotion = emotion_idx
                .and_then(|idx| columns.get(idx))
                .map(|name| EmotionLabel::parse(name))
                .unwrap_or(EmotionLabel::Neutral);

            samples.push(EmotionSample {
                emotion,
                intensity,
                timestamp,
            });
        }

        samples.sort_by_key(|sample| sample.timestamp);
        samples
    }
}

#[async_trait]
impl MetricsStore for InfluxMetricsStore {
    async fn write(&self, point: MetricPoint) -> sylph_core::Result<()> {
        let line = Self::to_line_protocol(&point);
        let url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            self.base_url, self.org, self.bucket
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .map_err(MemoryError::Http)?;

        if !response.status().is_success() {
            // Metric drop is tolerated; record it and move on
            warn!(
                "Metric write for {} dropped with status {}",
                point.measurement,
                response.status()
            );
        }
        Ok(())
    }

    async fn bot_emotion_series(
        &self,
        character_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> sylph_core::Result<Vec<EmotionSample>> {
        let flux = format!(
            r#"from(bucket: "{}")
  |> range(start: {})
  |> filter(fn: (r) => r._measurement == "bot_emotion")
  |> filter(fn: (r) => r.character == "{}" and r.user_id == "{}")
  |> filter(fn: (r) => r._field == "intensity")
  |> sort(columns: ["_time"])"#,
            self.bucket,
            since.to_rfc3339(),
            character_id,
            user_id
        );

        let url = format!("{}/api/v2/query?org={}", self.base_url, self.org);
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(flux)
            .send()
            .await
            .map_err(MemoryError::Http)?;

        if !response.status().is_success() {
            return Err(MemoryError::Connection(format!(
                "series query failed with status {}",
                response.status()
            ))
            .into());
        }

        let body = response.text().await.map_err(MemoryError::Http)?;
        let samples = Self::parse_series_csv(&body);
        debug!(
            "Fetched {} bot emotion samples for {}/{}",
            samples.len(),
            character_id,
            user_id
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_protocol_escaping() {
        let point = MetricPoint {
            measurement: "user_emotion",
            tags: vec![
                ("character", "elena rivers".to_string()),
                ("emotion", "joy".to_string()),
            ],
            fields: vec![("intensity", 0.8), ("confidence", 0.9)],
            timestamp: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let line = InfluxMetricsStore::to_line_protocol(&point);
        assert!(line.starts_with("user_emotion,character=elena\\ rivers,emotion=joy "));
        assert!(line.contains("intensity=0.8,confidence=0.9"));
        assert!(line.ends_with("1704067200000000000"));
    }

    #[test]
    fn test_series_csv_parsing() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string,string,string,string\n\
#group,false,false,false,false,true,true,true,true\n\
#default,_result,,,,,,,\n\
,result,table,_time,_value,_field,_measurement,character,emotion\n\
,_result,0,2024-01-01T00:00:00Z,0.4,intensity,bot_emotion,elena,joy\n\
,_result,0,2024-01-01T01:00:00Z,0.7,intensity,bot_emotion,elena,excitement\n";

        let samples = InfluxMetricsStore::parse_series_csv(body);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].emotion, EmotionLabel::Joy);
        assert!((samples[1].intensity - 0.7).abs() < 1e-6);
        assert!(samples[0].timestamp < samples[1].timestamp);
    }
}
