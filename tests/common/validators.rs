//! Output Validation Framework
//!
//! Validates that serialized decisions and explanations are structurally
//! correct and semantically valid, without golden output files.

#![allow(dead_code)]

use serde_json::{Map, Value};

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.valid = self.valid && other.valid;
    }
}

fn probability(obj: &Map<String, Value>, key: &str, ctx: &str, result: &mut ValidationResult) -> Option<f64> {
    match obj.get(key).and_then(Value::as_f64) {
        Some(p) if (0.0..=1.0 + 1e-6).contains(&p) => Some(p),
        Some(p) => {
            result.error(format!("{ctx}: {key} must be within [0, 1], got {p}"));
            None
        }
        None => {
            result.error(format!("{ctx}: {key} must be a number"));
            None
        }
    }
}

fn non_empty_string<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    ctx: &str,
    result: &mut ValidationResult,
) -> Option<&'a str> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Some(s),
        _ => {
            result.error(format!("{ctx}: {key} must be a non-empty string"));
            None
        }
    }
}

/// Validate a serialized `PredictionResult`
pub fn validate_prediction(output: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    let Some(obj) = output.as_object() else {
        result.error("Prediction must be an object".to_string());
        return result;
    };

    let predicted = non_empty_string(obj, "predicted_class", "prediction", &mut result);
    let confidence = probability(obj, "confidence", "prediction", &mut result);
    non_empty_string(obj, "model_version", "prediction", &mut result);

    if obj.get("ensemble_used").and_then(Value::as_bool).is_none() {
        result.error("prediction: ensemble_used must be a boolean".to_string());
    }
    match obj.get("processing_time_ms").and_then(Value::as_f64) {
        Some(ms) if ms >= 0.0 => {}
        _ => result.error("prediction: processing_time_ms must be non-negative".to_string()),
    }

    let Some(top) = obj.get("top_predictions").and_then(Value::as_array) else {
        result.error("prediction: top_predictions must be an array".to_string());
        return result;
    };
    if top.is_empty() || top.len() > 5 {
        result.error(format!(
            "prediction: top_predictions must hold 1-5 entries, got {}",
            top.len()
        ));
    }

    let mut previous: Option<(f64, u64)> = None;
    for (i, entry) in top.iter().enumerate() {
        let ctx = format!("top_predictions[{i}]");
        let Some(entry) = entry.as_object() else {
            result.error(format!("{ctx} must be an object"));
            continue;
        };
        non_empty_string(entry, "class_name", &ctx, &mut result);
        let Some(conf) = probability(entry, "confidence", &ctx, &mut result) else {
            continue;
        };
        let Some(index) = entry.get("class_index").and_then(Value::as_u64) else {
            result.error(format!("{ctx}: class_index must be a non-negative integer"));
            continue;
        };

        if let Some((prev_conf, prev_index)) = previous {
            if conf > prev_conf || (conf == prev_conf && index < prev_index) {
                result.error(format!("{ctx}: entries must be sorted by descending confidence"));
            }
        }
        previous = Some((conf, index));
    }

    if let (Some(first), Some(predicted), Some(confidence)) = (top.first(), predicted, confidence) {
        if first.get("class_name").and_then(Value::as_str) != Some(predicted) {
            result.error("prediction: top-1 entry must match predicted_class".to_string());
        }
        if obj.get("model_version").and_then(Value::as_str) != Some("demo-v1.0") {
            let top_conf = first.get("confidence").and_then(Value::as_f64).unwrap_or(-1.0);
            if (top_conf - confidence).abs() > 1e-6 {
                result.error("prediction: confidence must equal the top-1 confidence".to_string());
            }
        } else {
            result.warn("prediction: demo model in use".to_string());
        }
    }

    result
}

/// Validate a serialized `GateDecision`
pub fn validate_gate_decision(output: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    let Some(obj) = output.as_object() else {
        result.error("Decision must be an object".to_string());
        return result;
    };

    let outcome = obj.get("outcome").and_then(Value::as_str);
    let label = non_empty_string(obj, "display_label", "decision", &mut result);
    match obj.get("gap").and_then(Value::as_f64) {
        Some(gap) if (-1e-6..=1.0 + 1e-6).contains(&gap) => {}
        _ => result.error("decision: gap must be within [0, 1]".to_string()),
    }

    let Some(prediction) = obj.get("prediction") else {
        result.error("decision: missing prediction".to_string());
        return result;
    };
    result.merge(validate_prediction(prediction));

    let predicted = prediction.get("predicted_class").and_then(Value::as_str);
    match (outcome, label) {
        (Some("accepted"), Some(label)) if Some(label) != predicted => {
            result.error("decision: accepted label must equal predicted_class".to_string());
        }
        (Some("rejected_low_confidence"), Some(label))
            if label != "Unknown / Not a Medicinal Leaf" =>
        {
            result.error(format!("decision: unexpected low-confidence label {label:?}"));
        }
        (Some("rejected_ambiguous"), Some(label))
            if label != "Ambiguous Input / Multiple Species Detected" =>
        {
            result.error(format!("decision: unexpected ambiguous label {label:?}"));
        }
        (Some("accepted" | "rejected_low_confidence" | "rejected_ambiguous"), _) => {}
        (other, _) => result.error(format!("decision: unknown outcome {other:?}")),
    }

    result
}

/// Validate a serialized `ExplanationResult`
pub fn validate_explanation(output: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    let Some(obj) = output.as_object() else {
        result.error("Explanation must be an object".to_string());
        return result;
    };

    let kind = obj.get("kind").and_then(Value::as_str);
    let method = obj.get("method").and_then(Value::as_str);
    match (kind, method) {
        (Some("heatmap"), Some("Grad-CAM")) | (Some("segment_attribution"), Some("LIME")) => {}
        other => result.error(format!("explanation: inconsistent kind/method {other:?}")),
    }

    non_empty_string(obj, "predicted_class", "explanation", &mut result);
    probability(obj, "confidence", "explanation", &mut result);
    non_empty_string(obj, "explanation", "explanation", &mut result);

    match obj.get("overlay").and_then(Value::as_str) {
        Some(uri) if uri.starts_with(DATA_URI_PREFIX) && uri.len() > DATA_URI_PREFIX.len() => {}
        _ => result.error("explanation: overlay must be a PNG data URI".to_string()),
    }

    match (kind, obj.get("heatmap")) {
        (Some("heatmap"), Some(Value::String(uri))) if uri.starts_with(DATA_URI_PREFIX) => {}
        (Some("heatmap"), _) => result.error("explanation: heatmap must be a PNG data URI".to_string()),
        (_, Some(_)) => result.error("explanation: only heatmaps carry a raw heatmap".to_string()),
        _ => {}
    }

    if kind == Some("segment_attribution") {
        match obj.get("top_features").and_then(Value::as_array) {
            Some(features) if !features.is_empty() => {
                let total: f64 = features
                    .iter()
                    .filter_map(|f| f.get("importance").and_then(Value::as_f64))
                    .sum();
                if total > 1.0 + 1e-6 {
                    result.error(format!("explanation: feature importances sum to {total}"));
                }
            }
            _ => result.error("explanation: top_features must be a non-empty array".to_string()),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prediction() -> Value {
        json!({
            "predicted_class": "Mentha",
            "predicted_class_index": 1,
            "confidence": 0.9,
            "top_predictions": [
                {"class_name": "Mentha", "class_index": 1, "confidence": 0.9},
                {"class_name": "Aloe_vera", "class_index": 0, "confidence": 0.1}
            ],
            "model_version": "mobilenet-v2",
            "ensemble_used": false,
            "processing_time_ms": 5.0
        })
    }

    #[test]
    fn test_valid_decision() {
        let decision = json!({
            "outcome": "accepted",
            "display_label": "Mentha",
            "gap": 0.8,
            "prediction": prediction()
        });
        let result = validate_gate_decision(&decision);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn test_unsorted_top_k_is_rejected() {
        let mut bad = prediction();
        bad["top_predictions"][1]["confidence"] = json!(0.95);
        assert!(!validate_prediction(&bad).valid);
    }
}
