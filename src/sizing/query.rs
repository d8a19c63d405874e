use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::classifier::SizeClassifier;
use super::label::SizeLabel;
use crate::config::QueryConfig;
use crate::measure::LockedMeasurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Men,
    Women,
    Unisex,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryMeasurements {
    pub chest_cm: f32,
    pub shoulder_cm: f32,
    pub upper_waist_cm: f32,
}

/// 推薦サービスへ渡す問い合わせ
///
/// ロック済み寸法がサイズに分類できたときだけ作られる。
/// サイズは分類器の対応範囲に正規化済み。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationQuery {
    pub size: SizeLabel,
    pub gender: Gender,
    pub measurements: QueryMeasurements,
    pub max_recommendations: u32,
    pub include_images_only: bool,
}

impl RecommendationQuery {
    pub fn from_locked(
        measurement: &LockedMeasurement,
        classifier: &SizeClassifier,
        config: &QueryConfig,
    ) -> Option<Self> {
        let size = classifier.normalize(classifier.classify_locked(measurement)?);
        let upper_waist_cm = measurement.upper_waist_cm?;
        Some(Self {
            size,
            gender: config.gender,
            measurements: QueryMeasurements {
                chest_cm: measurement.chest_cm,
                shoulder_cm: measurement.shoulder_cm,
                upper_waist_cm,
            },
            max_recommendations: config.max_recommendations,
            include_images_only: config.include_images_only,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize recommendation query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::LockQuality;
    use crate::sizing::ClassifierMode;

    fn locked(waist: Option<f32>) -> LockedMeasurement {
        LockedMeasurement {
            chest_cm: 105.0,
            shoulder_cm: 50.0,
            upper_waist_cm: waist,
            quality: LockQuality {
                frame_count: 12,
                spread_cm: 0.4,
            },
        }
    }

    #[test]
    fn test_query_from_locked_measurement() {
        let classifier = SizeClassifier::new(ClassifierMode::Constrained);
        let query =
            RecommendationQuery::from_locked(&locked(Some(90.0)), &classifier, &QueryConfig::default())
                .unwrap();
        assert_eq!(query.size, SizeLabel::Xl);
        assert_eq!(query.gender, Gender::Men);
        assert_eq!(query.measurements.upper_waist_cm, 90.0);
        assert_eq!(query.max_recommendations, 10);
        assert!(query.include_images_only);
    }

    #[test]
    fn test_no_query_without_size() {
        let classifier = SizeClassifier::default();
        assert!(
            RecommendationQuery::from_locked(&locked(None), &classifier, &QueryConfig::default())
                .is_none()
        );
    }

    #[test]
    fn test_query_json_shape() {
        let classifier = SizeClassifier::new(ClassifierMode::General);
        let config = QueryConfig {
            gender: Gender::Unisex,
            max_recommendations: 3,
            include_images_only: false,
        };
        let query = RecommendationQuery::from_locked(&locked(Some(90.0)), &classifier, &config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&query.to_json().unwrap()).unwrap();
        // 105cm → L、比率 0.857 / 0.476 で -1
        assert_eq!(value["size"], "M");
        assert_eq!(value["gender"], "Unisex");
        assert_eq!(value["max_recommendations"], 3);
        assert_eq!(value["include_images_only"], false);
        assert_eq!(value["measurements"]["chest_cm"], 105.0);
    }
}
