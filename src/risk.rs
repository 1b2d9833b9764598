// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Composite Risk Fusion
//!
//! Combines a worker's physiological signals with the operational signals of
//! the machine they are assigned to into a single score in `[0, 1]`.
//!
//! ```text
//! human   = 0.4 * hr_risk + 0.3 * hrv_risk + 0.3 * fatigue_risk
//! machine = 0.6 * stress_risk + 0.4 * degradation (+ 0.15 with an active fault)
//! score   = 0.55 * human + 0.45 * machine
//! ```
//!
//! | Score | Level |
//! |-------|-------|
//! | `>= 0.75` | Critical |
//! | `>= 0.40` | Warning |
//! | otherwise | Safe |
//!
//! A metric that was never reported, or is not a finite number, carries no
//! risk. Everything here is pure: the same inputs always give bit-identical
//! results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Machine, Worker};

/// Score at or above which a worker is Critical.
pub const CRITICAL_THRESHOLD: f64 = 0.75;

/// Score at or above which a worker is at least Warning.
pub const WARNING_THRESHOLD: f64 = 0.40;

const HUMAN_WEIGHT: f64 = 0.55;
const MACHINE_WEIGHT: f64 = 0.45;
const FAULT_BOOST: f64 = 0.15;

/// Discrete risk classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
pub enum RiskLevel {
    Safe,
    Warning,
    Critical,
}

impl RiskLevel {
    pub fn classify(score: f64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            RiskLevel::Critical
        } else if score >= WARNING_THRESHOLD {
            RiskLevel::Warning
        } else {
            RiskLevel::Safe
        }
    }

    /// Position in display order (Critical first).
    pub fn display_rank(self) -> u8 {
        match self {
            RiskLevel::Critical => 0,
            RiskLevel::Warning => 1,
            RiskLevel::Safe => 2,
        }
    }
}

/// Result of fusing one worker/machine pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct CompositeRiskResult {
    pub score: f64,
    pub level: RiskLevel,
    pub human_risk: f64,
    pub machine_risk: f64,
}

impl CompositeRiskResult {
    fn none() -> Self {
        Self {
            score: 0.0,
            level: RiskLevel::Safe,
            human_risk: 0.0,
            machine_risk: 0.0,
        }
    }
}

/// Linear ramp: 0 at or below `lo`, 1 at or above `hi`.
pub fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if value <= lo {
        0.0
    } else if value >= hi {
        1.0
    } else {
        (value - lo) / (hi - lo)
    }
}

/// Ramp for a metric that was possibly never reported.
fn ramp(value: Option<f64>, lo: f64, hi: f64) -> f64 {
    signal(value).map_or(0.0, |v| normalize(v, lo, hi))
}

fn signal(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// HRV is inverse: 0 at 50 ms and above, 1 at 25 ms and below.
fn hrv_risk(hrv_ms: Option<f64>) -> f64 {
    match signal(hrv_ms) {
        None => 0.0,
        Some(h) if h >= 50.0 => 0.0,
        Some(h) if h <= 25.0 => 1.0,
        Some(h) => (50.0 - h) / 25.0,
    }
}

pub fn human_risk(worker: &Worker) -> f64 {
    let hr = ramp(worker.heart_rate_bpm, 80.0, 120.0);
    let hrv = hrv_risk(worker.hrv_ms);
    let fatigue = ramp(worker.fatigue_percent, 0.0, 100.0);
    (0.4 * hr + 0.3 * hrv + 0.3 * fatigue).clamp(0.0, 1.0)
}

pub fn machine_risk(machine: &Machine) -> f64 {
    let stress = ramp(machine.stress_index, 0.0, 100.0);
    let degradation = signal(machine.degradation).map_or(0.0, |d| d.clamp(0.0, 1.0));

    let mut risk = 0.6 * stress + 0.4 * degradation;
    if machine.has_active_fault() {
        risk += FAULT_BOOST;
    }
    risk.clamp(0.0, 1.0)
}

/// Fuse a worker with their (optional) assigned machine.
///
/// No worker means no risk: score 0, Safe.
pub fn compute_composite_risk(worker: Option<&Worker>, machine: Option<&Machine>) -> CompositeRiskResult {
    let Some(worker) = worker else {
        return CompositeRiskResult::none();
    };

    let human = human_risk(worker);
    let machine = machine.map_or(0.0, machine_risk);
    let score = (HUMAN_WEIGHT * human + MACHINE_WEIGHT * machine).clamp(0.0, 1.0);

    CompositeRiskResult {
        score,
        level: RiskLevel::classify(score),
        human_risk: human,
        machine_risk: machine,
    }
}

/// One row of the fleet risk table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct WorkerRisk {
    pub worker_id: String,
    /// Assigned machine, present only when that machine is registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(flatten)]
    pub risk: CompositeRiskResult,
}

/// Stable sort into display order: Critical, then Warning, then Safe.
/// Rows within a level keep their relative order.
pub fn sort_for_display(rows: &mut [WorkerRisk]) {
    rows.sort_by_key(|row| row.risk.level.display_rank());
}

/// Risk for every registered worker, joined with their assigned machine.
///
/// Workers are visited in id order, so the result is deterministic for a
/// given pair of registries.
pub fn fuse_fleet(
    workers: &BTreeMap<String, Worker>,
    machines: &BTreeMap<String, Machine>,
) -> Vec<WorkerRisk> {
    let mut rows: Vec<WorkerRisk> = workers
        .iter()
        .map(|(worker_id, worker)| {
            let machine = worker
                .assigned_machine
                .as_deref()
                .and_then(|id| machines.get_key_value(id));
            WorkerRisk {
                worker_id: worker_id.clone(),
                machine_id: machine.map(|(id, _)| id.clone()),
                risk: compute_composite_risk(Some(worker), machine.map(|(_, m)| m)),
            }
        })
        .collect();
    sort_for_display(&mut rows);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn worker(hr: f64, hrv: f64, fatigue: f64) -> Worker {
        Worker {
            worker_id: "W1".into(),
            heart_rate_bpm: Some(hr),
            hrv_ms: Some(hrv),
            fatigue_percent: Some(fatigue),
            ..Worker::default()
        }
    }

    fn machine(stress: f64, degradation: f64, faults: &[&str]) -> Machine {
        Machine {
            machine_id: "M1".into(),
            stress_index: Some(stress),
            degradation: Some(degradation),
            fault_codes: faults.iter().map(|f| f.to_string()).collect(),
            ..Machine::default()
        }
    }

    #[test]
    fn normalize_ramps_between_bounds() {
        assert_eq!(normalize(70.0, 80.0, 120.0), 0.0);
        assert_eq!(normalize(80.0, 80.0, 120.0), 0.0);
        assert_eq!(normalize(100.0, 80.0, 120.0), 0.5);
        assert_eq!(normalize(120.0, 80.0, 120.0), 1.0);
        assert_eq!(normalize(180.0, 80.0, 120.0), 1.0);
    }

    #[test]
    fn baseline_worker_without_machine_is_safe() {
        let result = compute_composite_risk(Some(&worker(80.0, 50.0, 0.0)), None);
        assert_eq!(result, CompositeRiskResult::none());
    }

    #[test]
    fn worst_case_saturates_at_one() {
        let result = compute_composite_risk(
            Some(&worker(120.0, 25.0, 100.0)),
            Some(&machine(100.0, 1.0, &["E1"])),
        );
        assert_eq!(result.human_risk, 1.0);
        assert_eq!(result.machine_risk, 1.0);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.level, RiskLevel::Critical);
    }

    #[test]
    fn elevated_heart_rate_alone_stays_safe() {
        let result = compute_composite_risk(Some(&worker(100.0, 50.0, 0.0)), None);
        assert!((result.score - 0.11).abs() < EPSILON);
        assert_eq!(result.level, RiskLevel::Safe);
    }

    #[test]
    fn hrv_is_inverse_and_linear() {
        assert_eq!(hrv_risk(Some(60.0)), 0.0);
        assert_eq!(hrv_risk(Some(25.0)), 1.0);
        assert_eq!(hrv_risk(Some(10.0)), 1.0);
        assert!((hrv_risk(Some(37.5)) - 0.5).abs() < EPSILON);
    }

    #[test]
    fn no_worker_means_no_risk() {
        let result = compute_composite_risk(None, Some(&machine(100.0, 1.0, &["E1"])));
        assert_eq!(result.score, 0.0);
        assert_eq!(result.level, RiskLevel::Safe);
    }

    #[test]
    fn missing_and_non_finite_metrics_carry_no_risk() {
        let bare = Worker {
            worker_id: "W9".into(),
            ..Worker::default()
        };
        assert_eq!(human_risk(&bare), 0.0);

        let broken = Worker {
            heart_rate_bpm: Some(f64::NAN),
            hrv_ms: Some(f64::NEG_INFINITY),
            fatigue_percent: Some(f64::INFINITY),
            ..bare
        };
        let result = compute_composite_risk(Some(&broken), None);
        assert!(result.score.is_finite());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn degradation_is_clamped_to_unit_range() {
        let over = machine(0.0, 7.5, &[]);
        assert!((machine_risk(&over) - 0.4).abs() < EPSILON);

        let negative = machine(0.0, -2.0, &[]);
        assert_eq!(machine_risk(&negative), 0.0);
    }

    #[test]
    fn fault_boost_is_clamped() {
        let healthy = machine(50.0, 0.5, &[]);
        let faulted = machine(50.0, 0.5, &["P0217"]);
        assert!((machine_risk(&healthy) - 0.5).abs() < EPSILON);
        assert!((machine_risk(&faulted) - 0.65).abs() < EPSILON);
        assert_eq!(machine_risk(&machine(100.0, 1.0, &["E1", "E2"])), 1.0);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(RiskLevel::classify(0.0), RiskLevel::Safe);
        assert_eq!(RiskLevel::classify(0.399_999), RiskLevel::Safe);
        assert_eq!(RiskLevel::classify(0.40), RiskLevel::Warning);
        assert_eq!(RiskLevel::classify(0.749_999), RiskLevel::Warning);
        assert_eq!(RiskLevel::classify(0.75), RiskLevel::Critical);
        assert_eq!(RiskLevel::classify(1.0), RiskLevel::Critical);
    }

    #[test]
    fn computation_is_bit_identical_on_repeat() {
        let w = worker(97.3, 33.1, 61.7);
        let m = machine(72.4, 0.31, &["E7"]);
        let a = compute_composite_risk(Some(&w), Some(&m));
        let b = compute_composite_risk(Some(&w), Some(&m));
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn fleet_joins_assigned_machines_and_sorts_stably() {
        let mut workers = BTreeMap::new();
        workers.insert("A".to_string(), worker(80.0, 60.0, 0.0));
        workers.insert(
            "B".to_string(),
            Worker {
                assigned_machine: Some("M1".into()),
                ..worker(120.0, 25.0, 100.0)
            },
        );
        workers.insert("C".to_string(), worker(85.0, 55.0, 5.0));
        workers.insert(
            "D".to_string(),
            Worker {
                assigned_machine: Some("GHOST".into()),
                ..worker(80.0, 60.0, 0.0)
            },
        );

        let mut machines = BTreeMap::new();
        machines.insert("M1".to_string(), machine(100.0, 1.0, &["E1"]));

        let rows = fuse_fleet(&workers, &machines);
        let order: Vec<&str> = rows.iter().map(|r| r.worker_id.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C", "D"]);

        assert_eq!(rows[0].machine_id.as_deref(), Some("M1"));
        assert_eq!(rows[0].risk.level, RiskLevel::Critical);
        // unregistered machine contributes nothing
        assert_eq!(rows[3].machine_id, None);
        assert_eq!(rows[3].risk.machine_risk, 0.0);
    }
}
