//! Shape checks for the `/evaluate` body.
//!
//! Checks run in a fixed order and the first failing check is reported;
//! nothing is aggregated.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{CreativeRequest, Dimensions, ScoringCriterion};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing or invalid 'creative_details' object.")]
    CreativeDetails,
    #[error("Invalid 'creative_details' fields.")]
    CreativeFields,
    #[error("Invalid 'dimensions' fields. Width and height must be numbers.")]
    Dimensions,
    #[error("Missing or invalid 'scoring_criteria'. It must be a non-empty array.")]
    ScoringCriteria,
    #[error("Invalid 'scoring_criteria'. Each criterion must have a 'parameter' (string) and 'weight' (number).")]
    Criterion,
}

pub fn validate_creative_request(body: &Value) -> Result<CreativeRequest, ValidationError> {
    let details = body
        .get("creative_details")
        .and_then(Value::as_object)
        .ok_or(ValidationError::CreativeDetails)?;

    let product_name = required_text(details, "product_name")?;
    let tagline = required_text(details, "tagline")?;
    let brand_palette = details
        .get("brand_palette")
        .and_then(Value::as_array)
        .ok_or(ValidationError::CreativeFields)?;
    let dimensions = details
        .get("dimensions")
        .filter(|v| !is_falsy(v))
        .ok_or(ValidationError::CreativeFields)?;
    let cta_text = required_text(details, "cta_text")?;
    let logo_url = required_text(details, "logo_url")?;
    let product_image_url = required_text(details, "product_image_url")?;

    let width = dimensions.get("width").and_then(Value::as_f64);
    let height = dimensions.get("height").and_then(Value::as_f64);
    let (Some(width), Some(height)) = (width, height) else {
        return Err(ValidationError::Dimensions);
    };

    let criteria = body
        .get("scoring_criteria")
        .and_then(Value::as_array)
        .filter(|rows| !rows.is_empty())
        .ok_or(ValidationError::ScoringCriteria)?;
    let scoring_criteria = criteria
        .iter()
        .map(|row| {
            let parameter = row.get("parameter").and_then(Value::as_str);
            let weight = row.get("weight").and_then(Value::as_f64);
            match (parameter, weight) {
                (Some(parameter), Some(weight)) => Ok(ScoringCriterion { parameter: parameter.to_string(), weight }),
                _ => Err(ValidationError::Criterion),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let target_audience = details
        .get("target_audience")
        .map(display_value)
        .filter(|s| !s.is_empty());

    Ok(CreativeRequest {
        product_name,
        tagline,
        brand_palette: brand_palette.iter().map(display_value).collect(),
        dimensions: Dimensions { width, height },
        cta_text,
        logo_url,
        product_image_url,
        target_audience,
        scoring_criteria,
    })
}

fn required_text(details: &Map<String, Value>, key: &str) -> Result<String, ValidationError> {
    details
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::CreativeFields)
}

/// `null`, `false`, `0` and `""` count as absent.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Renders a JSON scalar the way it reads in a prompt: strings unquoted.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
