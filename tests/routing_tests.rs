//! Convergence and progress properties of the routing core
//!
//! These tests simulate converged networks by giving every node a table
//! merged from the full membership, then walk messages hop by hop across
//! the per-node tables.

use lattica::id::{distance, prefix, Id};
use lattica::{RouteDecision, RoutingTable};
use std::collections::BTreeMap;

const LEAF_COUNT: usize = 8;

/// Build one converged table per member: every node has merged the whole
/// membership, as after sufficient quiescent maintenance rounds
fn converged_network(members: &[Id]) -> BTreeMap<Id, RoutingTable> {
    members
        .iter()
        .map(|&owner| {
            let mut table = RoutingTable::new(owner, LEAF_COUNT);
            let others: Vec<Id> = members.iter().copied().filter(|&id| id != owner).collect();
            table.merge(&others, |_| true);
            (owner, table)
        })
        .collect()
}

/// Route a message across the network, asserting per-hop progress, and
/// return the terminal node and hop count
fn walk(network: &BTreeMap<Id, RoutingTable>, start: Id, dest: Id) -> (Id, usize) {
    let mut current = start;
    let mut hops = 0;
    loop {
        match network[&current].lookup(dest) {
            RouteDecision::Local => return (current, hops),
            RouteDecision::Forward(next) => {
                let closer = distance(next, dest) < distance(current, dest);
                let longer = prefix(next, dest).0 > prefix(current, dest).0;
                assert!(
                    closer || longer,
                    "hop from {} to {} makes no progress toward {}",
                    current,
                    next,
                    dest
                );
                assert!(hops < network.len(), "routing loop toward {}", dest);
                current = next;
                hops += 1;
            }
        }
    }
}

/// 32 nodes evenly spread over the circle: two per value of the leading
/// digit, so every prefix cell of row zero is populated
fn uniform_grid() -> Vec<Id> {
    (0..32u128).map(|slot| Id(slot << 123)).collect()
}

fn pseudo_random_ids(count: usize, salt: u128) -> Vec<Id> {
    (1..=count as u128)
        .map(|i| Id((i + salt).wrapping_mul(0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c835)))
        .collect()
}

#[test]
fn uniform_network_meets_the_hop_bound() {
    let members = uniform_grid();
    let network = converged_network(&members);

    // N = 32, radix 16: ceil(log16 32) + 1 = 3
    let bound = 3;

    for dest in pseudo_random_ids(64, 7) {
        for &start in members.iter().step_by(5) {
            let (terminal, hops) = walk(&network, start, dest);
            assert!(
                hops <= bound,
                "{} hops from {} to {} (bound {})",
                hops,
                start,
                dest,
                bound
            );

            // Terminal node is the numerically closest member
            let best = members.iter().map(|&m| distance(m, dest)).min().unwrap();
            assert_eq!(
                distance(terminal, dest),
                best,
                "message to {} terminated at {} instead of the closest node",
                dest,
                terminal
            );
        }
    }
}

#[test]
fn sparse_network_routing_terminates_with_progress() {
    let members = pseudo_random_ids(48, 0);
    let network = converged_network(&members);

    for dest in pseudo_random_ids(40, 1000) {
        for &start in members.iter().step_by(7) {
            // walk() itself asserts progress and loop-freedom on each hop
            let (_, hops) = walk(&network, start, dest);
            assert!(hops < members.len());
        }
    }
}

#[test]
fn member_addressed_messages_reach_the_member() {
    let members = pseudo_random_ids(24, 0);
    let network = converged_network(&members);

    for &dest in &members {
        for &start in members.iter().step_by(3) {
            let (terminal, _) = walk(&network, start, dest);
            assert_eq!(terminal, dest);
        }
    }
}

#[test]
fn leaf_sets_stay_sorted_under_incremental_merges() {
    let members = pseudo_random_ids(30, 3);
    let mut table = RoutingTable::new(members[0], LEAF_COUNT);

    for chunk in members[1..].chunks(5) {
        table.merge(chunk, |_| true);
        let leaves = table.leaves();
        assert!(leaves.windows(2).all(|w| w[0] < w[1]));
        assert!(leaves.contains(&members[0]));
    }
}

#[test]
fn merge_reports_exactly_the_unconnected_survivors() {
    let members = pseudo_random_ids(12, 9);
    let mut table = RoutingTable::new(members[0], LEAF_COUNT);

    let connected = members[1];
    let fresh = table.merge(&members[1..], |id| id == connected);

    // Every reported id is referenced by the merged table and lacks a
    // connection; the connected peer is never reported
    for &id in &fresh {
        assert!(table.contains(id));
        assert_ne!(id, connected);
    }
    for id in table.entries() {
        assert!(fresh.contains(&id) || id == connected);
    }
}
