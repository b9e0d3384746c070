//! Arg-max decoding of classifier output

use boardscan_core::{DefectClass, Error, Prediction, Result};

/// Index of the highest score. Ties go to the lowest index and NaN never
/// wins. Returns `None` for an empty slice or one that is entirely NaN.
pub fn arg_max(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Map an output vector to the winning defect class and its raw score
pub fn decode_scores(scores: &[f32]) -> Result<Prediction> {
    if scores.len() != DefectClass::COUNT {
        return Err(Error::inference(format!(
            "Classifier returned {} scores, expected {}",
            scores.len(),
            DefectClass::COUNT
        )));
    }

    if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
        return Err(Error::inference(format!(
            "Classifier returned non-finite score {} for {}",
            scores[bad],
            DefectClass::from_index(bad).map(DefectClass::as_str).unwrap_or("?")
        )));
    }

    let index = arg_max(scores).ok_or_else(|| Error::inference("Classifier returned no scores"))?;
    let label = DefectClass::from_index(index)
        .ok_or_else(|| Error::inference(format!("No label for output index {}", index)))?;

    Ok(Prediction::new(label, scores[index]).with_scores(scores))
}
