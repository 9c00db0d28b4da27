use serde::Serialize;

use crate::features::FeatureRecord;
use crate::match_record::Outcome;
use crate::win_prob::{OutcomeModel, Prob3};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeagueScore {
    pub league_code: String,
    pub model: Metrics,
    pub base_rate: Metrics,
    pub ece_home: f64,
}

pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }

    let mut home = 0usize;
    let mut draw = 0usize;
    let mut away = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::Home => home += 1,
            Outcome::Draw => draw += 1,
            Outcome::Away => away += 1,
        }
    }
    let n = outcomes.len() as f64;
    Prob3 {
        home: home as f64 / n,
        draw: draw as f64 / n,
        away: away as f64 / n,
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);
        log_loss_sum += -p.get(*outcome).clamp(1e-12, 1.0).ln();
        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Expected calibration error for one class: count-weighted gap between
/// predicted and observed frequency per bin.
pub fn expected_calibration_error(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> f64 {
    let total = predictions.len().min(outcomes.len());
    if total == 0 {
        return 0.0;
    }
    calibration_bins(predictions, outcomes, class, bins)
        .iter()
        .map(|b| b.count as f64 / total as f64 * (b.avg_pred - b.actual_rate).abs())
        .sum()
}

/// Scores `model` on a replayed feature table, league by league. Rows must be
/// grouped by league (as `build_match_features` returns them). The baseline
/// predicts each league's running outcome frequencies, using only earlier rows.
pub fn score_feature_records(records: &[FeatureRecord], model: &dyn OutcomeModel) -> Vec<LeagueScore> {
    let mut out = Vec::new();
    for block in records.chunk_by(|a, b| a.league_code == b.league_code) {
        let mut model_preds = Vec::with_capacity(block.len());
        let mut base_preds = Vec::with_capacity(block.len());
        let mut outcomes = Vec::with_capacity(block.len());

        for rec in block {
            let Some(outcome) = rec.outcome() else {
                continue;
            };
            model_preds.push(model.predict(&rec.row));
            base_preds.push(empirical_outcome_probs(&outcomes));
            outcomes.push(outcome);
        }

        out.push(LeagueScore {
            league_code: block[0].league_code.clone(),
            model: evaluate_probs(&model_preds, &outcomes),
            base_rate: evaluate_probs(&base_preds, &outcomes),
            ece_home: expected_calibration_error(&model_preds, &outcomes, Outcome::Home, 10),
        });
    }
    out
}

fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}

fn argmax(p: Prob3) -> Outcome {
    if p.home >= p.draw && p.home >= p.away {
        Outcome::Home
    } else if p.draw >= p.away {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn uniform_log_loss_is_ln3() {
        let preds = vec![Prob3::uniform(); 4];
        let outcomes = vec![Outcome::Home, Outcome::Away, Outcome::Draw, Outcome::Home];
        let m = evaluate_probs(&preds, &outcomes);
        assert!((m.log_loss - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_yield_empty_metrics() {
        let m = evaluate_probs(&[Prob3::uniform()], &[]);
        assert_eq!(m.samples, 0);
    }

    #[test]
    fn empirical_rates_count_each_class() {
        let p = empirical_outcome_probs(&[Outcome::Home, Outcome::Home, Outcome::Draw, Outcome::Away]);
        assert_eq!(p.home, 0.5);
        assert_eq!(p.draw, 0.25);
        assert_eq!(p.away, 0.25);
    }

    #[test]
    fn calibrated_constant_prediction_has_zero_ece() {
        let p = Prob3 {
            home: 0.5,
            draw: 0.25,
            away: 0.25,
        };
        let preds = vec![p; 4];
        let outcomes = vec![Outcome::Home, Outcome::Away, Outcome::Home, Outcome::Draw];
        let ece = expected_calibration_error(&preds, &outcomes, Outcome::Home, 10);
        assert!(ece.abs() < 1e-12);
    }
}
