//! Largest-remainder (Hamilton) apportionment of weekly hours.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ScheduleError;
use crate::schedule::SubjectId;

/// Split `total_hours` into whole hours per subject, proportional to weight.
///
/// Without caps the result sums to exactly `total_hours`. A subject with a
/// cap never receives more than `floor(cap)`; when a cap binds, the total
/// may come out below `total_hours`.
///
/// # Errors
/// Returns [`ScheduleError::UnknownSubject`] when a cap names a subject that
/// is not in `weights`.
pub fn allocate_hours(
    weights: &BTreeMap<SubjectId, f64>,
    total_hours: u32,
    caps: Option<&BTreeMap<SubjectId, f64>>,
) -> Result<BTreeMap<SubjectId, u32>, ScheduleError> {
    let empty = BTreeMap::new();
    let caps = caps.unwrap_or(&empty);
    if let Some(unknown) = caps.keys().find(|id| !weights.contains_key(id)) {
        return Err(ScheduleError::UnknownSubject(*unknown));
    }

    if weights.is_empty() || total_hours == 0 {
        return Ok(BTreeMap::new());
    }

    let cap_of = |id: &SubjectId| caps.get(id).map(|c| c.max(0.0).floor() as u32);

    let total_weight: f64 = weights.values().map(|w| w.max(0.0)).sum();
    if total_weight <= 0.0 {
        let each = total_hours / weights.len() as u32;
        return Ok(weights
            .keys()
            .map(|id| (*id, cap_of(id).map_or(each, |c| c.min(each))))
            .collect());
    }

    // Move subjects into the capped set until no uncapped share exceeds its cap.
    let mut allocation: BTreeMap<SubjectId, u32> = BTreeMap::new();
    let mut capped: BTreeSet<SubjectId> = BTreeSet::new();
    let mut budget = total_hours;
    loop {
        let uncapped_weight: f64 = weights
            .iter()
            .filter(|(id, _)| !capped.contains(*id))
            .map(|(_, w)| w.max(0.0))
            .sum();

        let newly_capped: Vec<(SubjectId, u32)> = weights
            .iter()
            .filter(|(id, _)| !capped.contains(*id))
            .filter_map(|(id, w)| {
                let cap = caps.get(id)?;
                let share = if uncapped_weight > 0.0 {
                    w.max(0.0) * f64::from(budget) / uncapped_weight
                } else {
                    0.0
                };
                (*cap < share).then(|| (*id, cap.max(0.0).floor() as u32))
            })
            .collect();

        if newly_capped.is_empty() {
            break;
        }
        for (id, hours) in newly_capped {
            let hours = hours.min(budget);
            budget -= hours;
            allocation.insert(id, hours);
            capped.insert(id);
        }
    }

    let uncapped: Vec<(SubjectId, f64)> = weights
        .iter()
        .filter(|(id, _)| !capped.contains(*id))
        .map(|(id, w)| (*id, w.max(0.0)))
        .collect();
    let uncapped_weight: f64 = uncapped.iter().map(|(_, w)| w).sum();

    if uncapped.is_empty() || uncapped_weight <= 0.0 {
        for (id, _) in &uncapped {
            allocation.insert(*id, 0);
        }
        return Ok(allocation);
    }

    let mut remainders: Vec<(SubjectId, f64, f64)> = Vec::with_capacity(uncapped.len());
    let mut floors_sum = 0u32;
    for (id, weight) in &uncapped {
        let exact = weight * f64::from(budget) / uncapped_weight;
        let floor = exact.floor() as u32;
        floors_sum += floor;
        allocation.insert(*id, floor);
        remainders.push((*id, exact - f64::from(floor), *weight));
    }

    // Largest remainder first, then larger weight, then smaller id
    remainders.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut leftover = budget.saturating_sub(floors_sum);
    for (id, _, _) in remainders.iter().cycle().take(remainders.len() * 2) {
        if leftover == 0 {
            break;
        }
        let hours = allocation.entry(*id).or_insert(0);
        if cap_of(id).is_some_and(|c| *hours >= c) {
            continue;
        }
        *hours += 1;
        leftover -= 1;
    }

    Ok(allocation)
}
