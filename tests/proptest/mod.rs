// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for availability evaluation and replica bookkeeping
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Quantifier operators agree with plain counting over the events
//! 2. The probe event window never keeps stale, foreign or duplicate pods
//! 3. Env merging is first-wins and free of duplicates
//! 4. Replica bookkeeping never tracks a replica twice
//! 5. Component naming round-trips

use std::collections::BTreeSet;

use proptest::prelude::*;

use component_operator::available::{ProbeEvent, evaluate_condition, pick_probe_events};
use component_operator::component::{full_name, generate_pod_names, short_name};
use component_operator::crd::{
    ActionCriteria, ComponentAvailableCondition, ComponentAvailableConditionX, InstanceSet,
    InstanceSetSpec,
};
use component_operator::lifecycle::render::merge_envs;
use component_operator::replicas::task::remove_task_replica;
use component_operator::replicas::{
    Task, delete_replicas_status, get_replicas_status, new_replicas_status,
};
use component_operator::resources::common::env;
use jiff::Timestamp;

const COMP: &str = "mycluster-mysql";

// =============================================================================
// Helper functions
// =============================================================================

fn succeed() -> Box<ComponentAvailableConditionX> {
    Box::new(ComponentAvailableConditionX {
        criteria: ActionCriteria {
            succeed: Some(true),
            ..Default::default()
        },
        ..Default::default()
    })
}

fn strict_succeed() -> Box<ComponentAvailableConditionX> {
    let mut x = succeed();
    x.strict = Some(true);
    x
}

/// One event per replica for the first `codes.len()` replicas
fn events(codes: &[i32], now: i64) -> Vec<ProbeEvent> {
    codes
        .iter()
        .enumerate()
        .map(|(i, code)| ProbeEvent {
            pod_name: format!("{COMP}-{i}"),
            pod_uid: String::new(),
            timestamp: Timestamp::from_second(now).unwrap(),
            code: *code,
            stdout: String::new(),
            stderr: String::new(),
        })
        .collect()
}

fn instance_set(replicas: i32) -> InstanceSet {
    let mut its = InstanceSet::new(
        COMP,
        InstanceSetSpec {
            replicas,
            ..Default::default()
        },
    );
    its.metadata.generation = Some(1);
    its
}

// =============================================================================
// Strategy generators
// =============================================================================

/// Replica count and exit codes for up to that many replicas
fn replicas_and_codes() -> impl Strategy<Value = (i32, Vec<i32>)> {
    (1..=9i32).prop_flat_map(|replicas| {
        let max = usize::try_from(replicas).unwrap();
        (
            Just(replicas),
            prop::collection::vec(prop_oneof![3 => Just(0), 1 => 1..=127i32], 0..=max),
        )
    })
}

/// Replica names drawn from a small pool so that duplicates show up
fn replica_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec((0..6u8).prop_map(|i| format!("{COMP}-{i}")), 0..10)
}

/// Env entries over a small name pool, tagged with their position
fn env_entries() -> impl Strategy<Value = Vec<(String, usize)>> {
    prop::collection::vec("[A-D]", 0..16).prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect()
    })
}

// =============================================================================
// Availability properties
// =============================================================================

proptest! {
    #[test]
    fn majority_matches_counting((replicas, codes) in replicas_and_codes()) {
        let cond = ComponentAvailableCondition {
            majority: Some(succeed()),
            ..Default::default()
        };
        let ok = codes.iter().filter(|c| **c == 0).count();
        let expected = ok > usize::try_from(replicas / 2).unwrap();
        prop_assert_eq!(evaluate_condition(&cond, replicas, &events(&codes, 1000)), expected);
    }

    #[test]
    fn all_any_none_agree((replicas, codes) in replicas_and_codes()) {
        let evs = events(&codes, 1000);
        let all = ComponentAvailableCondition { all: Some(succeed()), ..Default::default() };
        let any = ComponentAvailableCondition { any: Some(succeed()), ..Default::default() };
        let none = ComponentAvailableCondition { none: Some(succeed()), ..Default::default() };

        prop_assert_eq!(evaluate_condition(&all, replicas, &evs), codes.iter().all(|c| *c == 0));
        prop_assert_eq!(evaluate_condition(&any, replicas, &evs), codes.contains(&0));
        prop_assert_eq!(
            evaluate_condition(&none, replicas, &evs),
            !evaluate_condition(&any, replicas, &evs)
        );
    }

    #[test]
    fn strict_requires_every_replica((replicas, codes) in replicas_and_codes()) {
        let evs = events(&codes, 1000);
        let strict_all = ComponentAvailableCondition {
            all: Some(strict_succeed()),
            ..Default::default()
        };
        let complete = codes.len() == usize::try_from(replicas).unwrap();
        prop_assert_eq!(
            evaluate_condition(&strict_all, replicas, &evs),
            complete && codes.iter().all(|c| *c == 0)
        );
    }

    #[test]
    fn not_negates(codes in prop::collection::vec(0..=1i32, 1..=1)) {
        let cond = ComponentAvailableCondition { not: Some(succeed()), ..Default::default() };
        prop_assert_eq!(evaluate_condition(&cond, 1, &events(&codes, 1000)), codes[0] != 0);
    }

    #[test]
    fn picked_events_are_fresh_and_unique(
        raw in prop::collection::vec((0..12i32, 0..60i64), 0..30),
        replicas in 0..8i32,
        window in 1..30i32,
    ) {
        let now = 10_000i64;
        let evs: Vec<ProbeEvent> = raw
            .iter()
            .map(|(pod, age)| ProbeEvent {
                pod_name: format!("{COMP}-{pod}"),
                pod_uid: String::new(),
                timestamp: Timestamp::from_second(now - age).unwrap(),
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
            .collect();
        let pods: BTreeSet<String> = generate_pod_names(COMP, replicas).into_iter().collect();
        let now_ts = Timestamp::from_second(now).unwrap();

        let picked = pick_probe_events(evs.clone(), window, COMP, replicas, now_ts);

        let names: Vec<&str> = picked.iter().map(|e| e.pod_name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(&names, &sorted);
        for event in &picked {
            prop_assert!(pods.contains(&event.pod_name));
            prop_assert!(event.timestamp.as_second() > now - i64::from(window));
            // nothing newer for the same pod was dropped
            prop_assert!(evs
                .iter()
                .filter(|e| e.pod_name == event.pod_name)
                .all(|e| e.timestamp <= event.timestamp));
        }
    }
}

// =============================================================================
// Env and bookkeeping properties
// =============================================================================

proptest! {
    #[test]
    fn merge_envs_first_wins(entries in env_entries()) {
        let merged = merge_envs(entries.iter().map(|(name, i)| env(name, i.to_string())));

        let names: Vec<&str> = merged.iter().map(|e| e.name.as_str()).collect();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        prop_assert_eq!(names.len(), unique.len());

        for e in &merged {
            let first = entries.iter().find(|(name, _)| *name == e.name).unwrap();
            prop_assert_eq!(e.value.clone(), Some(first.1.to_string()));
        }
        prop_assert_eq!(merge_envs(merged.clone()), merged);
    }

    #[test]
    fn replicas_tracked_once(added in replica_names(), removed in replica_names()) {
        let mut its = instance_set(6);
        new_replicas_status(&mut its, &added, true, true).unwrap();
        new_replicas_status(&mut its, &added, false, false).unwrap();

        let status = get_replicas_status(&its).unwrap();
        let names: Vec<&str> = status.status.iter().map(|s| s.name.as_str()).collect();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        prop_assert_eq!(names.len(), unique.len());
        let expected: BTreeSet<&str> = added.iter().map(String::as_str).collect();
        prop_assert_eq!(&unique, &expected);

        let mut seen = Vec::new();
        delete_replicas_status(&mut its, &removed, |s| seen.push(s.name.clone())).unwrap();
        let left = get_replicas_status(&its).unwrap();
        prop_assert!(left.status.iter().all(|s| !removed.contains(&s.name)));
        prop_assert_eq!(seen.len() + left.status.len(), unique.len());
    }

    #[test]
    fn task_replica_removal(targets in replica_names(), gone in (0..6u8).prop_map(|i| format!("{COMP}-{i}"))) {
        let mut tasks: Vec<Task> = vec![Task {
            instance: COMP.to_string(),
            task: "newReplica".to_string(),
            uid: "1".to_string(),
            replicas: targets.join(","),
            notify_at_finish: true,
            report_period_seconds: 60,
            new_replica: None,
        }];

        remove_task_replica(&mut tasks, "1", &gone);

        let remaining: Vec<&String> = targets.iter().filter(|t| **t != gone).collect();
        if remaining.is_empty() {
            prop_assert!(tasks.is_empty());
        } else {
            prop_assert_eq!(tasks.len(), 1);
            prop_assert!(tasks[0].replicas.split(',').all(|r| !r.is_empty() && r != gone));
        }
    }

    #[test]
    fn component_names_round_trip(cluster in "[a-z][a-z0-9]{0,8}", comp in "[a-z][a-z0-9-]{0,8}") {
        prop_assert_eq!(short_name(&cluster, &full_name(&cluster, &comp)).unwrap(), comp);
    }
}
