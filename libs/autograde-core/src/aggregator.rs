/// Grade Aggregation
///
/// **Scoring Rules:**
/// - `earned` = sum of points of `PASSED` units
/// - `total` = sum of all unit points; zero is an error, never a 0 grade
/// - `grade` = earned / total * 100, rounded half up
///
/// **Infrastructure-affected units** are listed separately and handled by
/// `PartialPolicy`: `Block` withholds the grade entirely, `CompletedOnly`
/// grades over the unaffected units and marks the report partial.

use crate::error::GradingError;
use crate::splitter::ParseError;
use autograde_common::config::PartialPolicy;
use autograde_common::types::{ExecutionResult, Outcome, TestUnit, UnitBreakdown};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeReport {
    pub earned_points: u32,
    pub total_points: u32,
    /// `None` when infrastructure failures prevent a fair grade.
    pub grade: Option<u8>,
    pub partial: bool,
    pub infra_affected: Vec<String>,
    pub by_outcome: BTreeMap<Outcome, u32>,
    pub breakdown: Vec<UnitBreakdown>,
}

/// Percentage rounded half up, computed in integers.
pub fn percentage(earned: u32, total: u32) -> Result<u8, GradingError> {
    if total == 0 {
        return Err(GradingError::ZeroTotalPoints);
    }
    let earned = u64::from(earned.min(total));
    let total = u64::from(total);
    let grade = (earned * 200 + total) / (2 * total);
    Ok(grade.min(100) as u8)
}

pub fn aggregate(
    units: &[TestUnit],
    results: &[ExecutionResult],
    policy: PartialPolicy,
) -> Result<GradeReport, GradingError> {
    let total_points = units
        .iter()
        .try_fold(0u32, |sum, u| sum.checked_add(u.points))
        .ok_or(ParseError::PointsOverflow)?;
    if total_points == 0 {
        return Err(GradingError::ZeroTotalPoints);
    }

    let by_id: HashMap<&str, &ExecutionResult> = results.iter().map(|r| (r.unit_id.as_str(), r)).collect();

    let mut breakdown = Vec::with_capacity(units.len());
    let mut by_outcome = BTreeMap::new();
    let mut infra_affected = Vec::new();
    let mut earned_points = 0;
    let mut counted_points = 0;
    let mut counted_earned = 0;

    for unit in units {
        let result = by_id
            .get(unit.id.as_str())
            .ok_or_else(|| GradingError::MissingResult(unit.id.clone()))?;

        let earned = if result.outcome == Outcome::Passed { unit.points } else { 0 };
        earned_points += earned;
        *by_outcome.entry(result.outcome).or_insert(0) += 1;

        if result.is_infra_affected() {
            infra_affected.push(unit.id.clone());
        } else {
            counted_points += unit.points;
            counted_earned += earned;
        }

        breakdown.push(UnitBreakdown {
            unit_id: unit.id.clone(),
            label: unit.label.clone(),
            outcome: result.outcome,
            points: unit.points,
            earned,
            visible: unit.visible,
            time_ms: result.time_ms,
            memory_kb: result.memory_kb,
            infra_failure: result.infra_failure.clone(),
        });
    }

    let (grade, partial) = if infra_affected.is_empty() {
        (Some(percentage(earned_points, total_points)?), false)
    } else {
        match policy {
            PartialPolicy::Block => (None, false),
            // All units affected: nothing left to grade over
            PartialPolicy::CompletedOnly if counted_points == 0 => (None, true),
            PartialPolicy::CompletedOnly => (Some(percentage(counted_earned, counted_points)?), true),
        }
    };

    Ok(GradeReport {
        earned_points: if partial { counted_earned } else { earned_points },
        total_points: if partial { counted_points } else { total_points },
        grade,
        partial,
        infra_affected,
        by_outcome,
        breakdown,
    })
}
