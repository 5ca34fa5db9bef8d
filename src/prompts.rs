//! Prompt text for the three evaluation stages.
//!
//! User-supplied text is interpolated verbatim, with no escaping.

use crate::models::{CreativeRequest, ObservedScore, ScoringCriterion};

/// The generation and scoring prompts always name five criteria.
pub const CRITERIA_SLOTS: usize = 5;

/// Rendered in place of a value the caller did not supply.
pub const UNSET: &str = "undefined";

/// Llama-3 chat template; `{prompt}` is filled in by the completion model.
pub const LLAMA3_PROMPT_TEMPLATE: &str = "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\nyou are a talented graphic designer. Analyze the provided product details without altering them. Generate a dynamic image generation prompt under 200 words in a simple flowing paragraph style. Include visual styles, color palettes, typography, and layout recommendations, tailored to the specified product category. Focus on enhancing visual appeal while preserving the given details. Include placement suggestions for taglines, CTAs, logos, and other elements to ensure a clean and professional composition. Optimize for modern design trends and aesthetic harmony suitable for the target audience. Only give the prompt, nothing else, not even intro text.<|eot_id|><|start_header_id|>user<|end_header_id|>\n\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n";

pub fn generation_prompt(req: &CreativeRequest) -> String {
    let audience = req.target_audience.as_deref().unwrap_or(UNSET);
    let distribution = criteria_slots(&req.scoring_criteria)
        .map(|(name, weight)| format!("{name} around {weight}%"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Create a graphic creative prompt for this product with its name being {} and the target audience being {audience}, \
        the tagline of the brand is {} and the button for call to action is {}. \
        The brand follows the color palette as {}. \
        Out of a hundred percent distribute the weight of the generated image on {distribution} making it a total of 100% ",
        req.product_name,
        req.tagline,
        req.cta_text,
        req.brand_palette.join(","),
    )
}

pub fn scoring_prompt(criteria: &[ScoringCriterion]) -> String {
    let format_line = criteria_slots(criteria)
        .map(|(name, _)| format!("{name} : observed %"))
        .chain(std::iter::once("totalScore : sum of all observed score %".to_string()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "While generating this image I specified weights to focus on across different parameters, making it a total of 100%. \
        The overall summation of weights is 100, so analyze how the percentage of weight is distributed across the parameters. \
        Now analyze the given image and tell me, out of 100%, how much in percentage each given parameter weighs in the image, and the sum of the observed weights. \
        The total score will be 100%, so analyze the image's parameter weight distribution accordingly. \
        I want observed values to test the accuracy of my image generation model, so do a thorough critical analysis and strictly respond only in the format I specify, \
        with no intro or outro text: \"{format_line}\""
    )
}

/// Pulls `name : 20 %` pairs out of scoring text. The total is not a criterion and is skipped.
pub fn parse_observed_scores(text: &str) -> Vec<ObservedScore> {
    text.trim()
        .trim_matches('"')
        .split(',')
        .filter_map(|pair| {
            let (name, value) = pair.split_once(':')?;
            let name = name.trim();
            if name.is_empty() || name.eq_ignore_ascii_case("totalscore") {
                return None;
            }
            let observed = value.trim().trim_end_matches('%').trim().parse::<f64>().ok()?;
            Some(ObservedScore { parameter: name.to_string(), observed })
        })
        .collect()
}

/// Exactly five `(name, weight)` slots; slots past the supplied criteria read as [`UNSET`].
fn criteria_slots(criteria: &[ScoringCriterion]) -> impl Iterator<Item = (String, String)> + '_ {
    (0..CRITERIA_SLOTS).map(move |i| match criteria.get(i) {
        Some(c) => (c.parameter.clone(), format_weight(c.weight)),
        None => (UNSET.to_string(), UNSET.to_string()),
    })
}

fn format_weight(weight: f64) -> String {
    if weight.is_finite() && weight.fract() == 0.0 {
        format!("{}", weight as i64)
    } else {
        weight.to_string()
    }
}
