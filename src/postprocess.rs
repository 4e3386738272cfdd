use serde::{Serialize, Serializer};

use crate::error::PredictError;

/// One class/probability pair. The probability keeps full precision in
/// memory; serialization renders the 4-decimal display form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(serialize_with = "four_decimals")]
    pub probability: f32,
}

/// Ranked output of one inference. `all` covers every class the model knows,
/// sorted by descending probability; `top` duplicates the head entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub top: Prediction,
    pub all: Vec<Prediction>,
}

fn four_decimals<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:.4}"))
}

/// Sorts descending by probability. The sort is stable, so classes with equal
/// scores keep the model's label order. Ranking happens at full precision;
/// rounding is purely a serialization concern.
pub fn format_predictions(
    mut entries: Vec<Prediction>,
) -> Result<PredictionResult, PredictError> {
    if entries.is_empty() {
        return Err(PredictError::EmptyPredictionSet);
    }
    entries.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    let top = entries[0].clone();
    Ok(PredictionResult { top, all: entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(class_name: &str, probability: f32) -> Prediction {
        Prediction {
            class_name: class_name.to_string(),
            probability,
        }
    }

    #[test]
    fn sorts_descending_and_top_is_head() {
        let result = format_predictions(vec![
            entry("cat", 0.1),
            entry("dog", 0.7),
            entry("bird", 0.2),
        ])
        .unwrap();

        assert_eq!(result.top.class_name, "dog");
        assert_eq!(result.top, result.all[0]);
        let probs: Vec<f32> = result.all.iter().map(|p| p.probability).collect();
        assert_eq!(probs, vec![0.7, 0.2, 0.1]);
        assert!(probs.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn ties_keep_label_order() {
        let result = format_predictions(vec![
            entry("first", 0.5),
            entry("second", 0.5),
            entry("third", 0.5),
        ])
        .unwrap();

        let names: Vec<&str> = result.all.iter().map(|p| p.class_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn formatting_is_idempotent() {
        let entries = vec![entry("a", 0.3), entry("b", 0.6), entry("c", 0.1)];
        let once = format_predictions(entries.clone()).unwrap();
        let twice = format_predictions(once.all.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn ranking_happens_before_rounding() {
        // Both round to "0.7000" but the full-precision order must hold.
        let result =
            format_predictions(vec![entry("low", 0.70001), entry("high", 0.70004)]).unwrap();
        assert_eq!(result.all[0].class_name, "high");
        assert_eq!(result.all[1].class_name, "low");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["all"][0]["probability"], "0.7000");
        assert_eq!(json["all"][1]["probability"], "0.7000");
    }

    #[test]
    fn probabilities_serialize_as_four_decimal_strings() {
        let json = serde_json::to_value(entry("dog", 0.7)).unwrap();
        assert_eq!(json["className"], "dog");
        assert_eq!(json["probability"], "0.7000");
    }

    #[test]
    fn empty_prediction_set_is_an_error() {
        let err = format_predictions(Vec::new()).unwrap_err();
        assert!(matches!(err, PredictError::EmptyPredictionSet));
    }
}
