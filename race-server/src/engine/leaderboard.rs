use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::{Participant, ParticipantStatus, Seed};

fn status_bucket(status: ParticipantStatus) -> u8 {
    match status {
        ParticipantStatus::Finished => 0,
        ParticipantStatus::Playing => 1,
        ParticipantStatus::Ready => 2,
        ParticipantStatus::Registered => 3,
        ParticipantStatus::Abandoned => 4,
    }
}

fn layer_entry_igt_or_igt(p: &Participant, seed: &Seed) -> i64 {
    p.layer_entry_igt(p.current_layer, |id| seed.tier_of(id))
        .unwrap_or(p.igt_ms)
}

/// Sorts participants by terminal bucket, then within-bucket tiebreaks.
/// `registration_order` gives each participant's stable index for the
/// non-competitive buckets.
pub fn sort_participants<'a>(
    participants: &'a [Participant],
    seed: &Seed,
    registration_order: &HashMap<uuid::Uuid, usize>,
) -> Vec<&'a Participant> {
    let mut sorted: Vec<&Participant> = participants.iter().collect();
    sorted.sort_by(|a, b| {
        let bucket_a = status_bucket(a.status);
        let bucket_b = status_bucket(b.status);
        if bucket_a != bucket_b {
            return bucket_a.cmp(&bucket_b);
        }

        match a.status {
            ParticipantStatus::Finished => a.igt_ms.cmp(&b.igt_ms),
            ParticipantStatus::Playing => {
                let layer_cmp = b.current_layer.cmp(&a.current_layer);
                if layer_cmp != Ordering::Equal {
                    return layer_cmp;
                }
                let entry_a = layer_entry_igt_or_igt(a, seed);
                let entry_b = layer_entry_igt_or_igt(b, seed);
                let entry_cmp = entry_a.cmp(&entry_b);
                if entry_cmp != Ordering::Equal {
                    return entry_cmp;
                }
                a.igt_ms.cmp(&b.igt_ms)
            }
            _ => {
                let order_a = registration_order.get(&a.id).copied().unwrap_or(usize::MAX);
                let order_b = registration_order.get(&b.id).copied().unwrap_or(usize::MAX);
                order_a.cmp(&order_b)
            }
        }
    });
    sorted
}

/// Builds `layer → first igt_ms at which the leader reached that layer`,
/// one pass over the leader's zone history, first occurrence per tier wins.
fn leader_splits(leader: &Participant, seed: &Seed) -> HashMap<i32, i64> {
    let mut splits = HashMap::new();
    for entry in &leader.zone_history {
        if let Some(tier) = seed.tier_of(&entry.node_id) {
            splits.entry(tier).or_insert(entry.igt_ms);
        }
    }
    splits
}

/// Computes the gap to leader for every participant in sorted order.
/// Returns a parallel vector of `Option<i64>` gaps.
pub fn compute_gaps(sorted: &[&Participant], seed: &Seed) -> Vec<Option<i64>> {
    let leader_idx = sorted
        .iter()
        .position(|p| matches!(p.status, ParticipantStatus::Playing | ParticipantStatus::Finished));

    let Some(leader_idx) = leader_idx else {
        return vec![None; sorted.len()];
    };

    let leader = sorted[leader_idx];
    let splits = leader_splits(leader, seed);

    sorted
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if i == leader_idx {
                return None;
            }
            match p.status {
                ParticipantStatus::Finished => Some(p.igt_ms - leader.igt_ms),
                ParticipantStatus::Playing => splits.get(&p.current_layer).map(|&t| p.igt_ms - t),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeedNode;
    use chrono::Utc;
    use uuid::Uuid;

    fn seed() -> Seed {
        Seed {
            id: Uuid::new_v4(),
            pool_name: "default".into(),
            total_layers: 3,
            nodes: vec![
                SeedNode { id: "start".into(), tier: 0, kind: "start".into(), name: "Start".into() },
                SeedNode { id: "z1".into(), tier: 1, kind: "zone".into(), name: "Zone 1".into() },
                SeedNode { id: "z2".into(), tier: 2, kind: "zone".into(), name: "Zone 2".into() },
                SeedNode { id: "finish".into(), tier: 3, kind: "finish".into(), name: "Finish".into() },
            ],
        }
    }

    fn participant(name: &str, status: ParticipantStatus, layer: i32, igt_ms: i64, history: &[(&str, i64)]) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            race_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            login: name.into(),
            display_name: name.into(),
            mod_token: "tok".into(),
            status,
            current_zone: history.last().map(|(n, _)| n.to_string()),
            current_layer: layer,
            igt_ms,
            death_count: 0,
            zone_history: history
                .iter()
                .map(|(node_id, igt)| crate::domain::ZoneHistoryEntry {
                    node_id: node_id.to_string(),
                    igt_ms: *igt,
                    deaths: 0,
                })
                .collect(),
            last_igt_change_at: Some(Utc::now()),
            finished_at: None,
            color_index: 0,
            is_live: true,
        }
    }

    #[test]
    fn scenario_s1_three_player_clean_race() {
        let seed = seed();
        let a = participant("A", ParticipantStatus::Playing, 2, 120_000, &[("z1", 60_000), ("z2", 120_000)]);
        let b = participant("B", ParticipantStatus::Playing, 2, 130_000, &[("z1", 50_000), ("z2", 130_000)]);
        let c = participant("C", ParticipantStatus::Playing, 2, 110_000, &[("z1", 70_000), ("z2", 110_000)]);

        let order = HashMap::new();
        let participants = vec![a.clone(), b.clone(), c.clone()];
        let sorted = sort_participants(&participants, &seed, &order);

        assert_eq!(sorted[0].display_name, "C");
        assert_eq!(sorted[1].display_name, "A");
        assert_eq!(sorted[2].display_name, "B");
    }

    #[test]
    fn finished_participants_sort_before_playing() {
        let seed = seed();
        let finished = participant("F", ParticipantStatus::Finished, 3, 300_000, &[("finish", 300_000)]);
        let playing = participant("P", ParticipantStatus::Playing, 2, 100_000, &[]);
        let order = HashMap::new();
        let participants = vec![playing.clone(), finished.clone()];
        let sorted = sort_participants(&participants, &seed, &order);
        assert_eq!(sorted[0].display_name, "F");
    }

    #[test]
    fn gap_is_null_for_leader_and_non_competitive_statuses() {
        let seed = seed();
        let leader = participant("L", ParticipantStatus::Playing, 1, 60_000, &[("z1", 60_000)]);
        let registered = participant("R", ParticipantStatus::Registered, 0, 0, &[]);
        let order = HashMap::new();
        let participants = vec![leader.clone(), registered.clone()];
        let sorted = sort_participants(&participants, &seed, &order);
        let gaps = compute_gaps(&sorted, &seed);
        assert_eq!(gaps[0], None);
        assert_eq!(gaps[1], None);
    }

    #[test]
    fn gap_for_playing_participant_uses_leader_split_at_same_layer() {
        let seed = seed();
        let leader = participant("L", ParticipantStatus::Playing, 2, 120_000, &[("z1", 60_000), ("z2", 120_000)]);
        let trailing = participant("T", ParticipantStatus::Playing, 1, 80_000, &[("z1", 80_000)]);
        let order = HashMap::new();
        let participants = vec![leader.clone(), trailing.clone()];
        let sorted = sort_participants(&participants, &seed, &order);
        let gaps = compute_gaps(&sorted, &seed);
        // trailing is at layer 1; leader reached layer 1 at igt 60_000
        let trailing_gap = gaps[sorted.iter().position(|p| p.display_name == "T").unwrap()];
        assert_eq!(trailing_gap, Some(80_000 - 60_000));
    }

    #[test]
    fn no_gap_when_no_playing_or_finished_participant_exists() {
        let seed = seed();
        let registered = participant("R", ParticipantStatus::Registered, 0, 0, &[]);
        let order = HashMap::new();
        let participants = vec![registered.clone()];
        let sorted = sort_participants(&participants, &seed, &order);
        let gaps = compute_gaps(&sorted, &seed);
        assert_eq!(gaps, vec![None]);
    }
}
