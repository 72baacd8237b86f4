// src/clustering/merge.rs - Multi-source deduplication and priority merge
use indicatif::MultiProgress;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::matching::tag_record;
use crate::matching::url::identity_domain;
use crate::models::core::{fill_if_empty, has_text, CompanyRecord};
use crate::models::stats_models::MergeStats;
use crate::utils::progress_bars::logging::{PipelineLogger, PipelineStage};
use crate::utils::progress_bars::progress_config::add_bar;

/// Something the merge engine refused to decide silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeConflict {
    /// One non-aggregator domain claimed by companies with different names.
    /// The records are kept apart.
    DomainReuse { domain: String, names: Vec<String> },
    /// One normalized name seen under several domains. The records are kept
    /// apart; name-only records with this name attach to `attached_domain`.
    NameCollision {
        normalized_name: String,
        domains: Vec<String>,
        names: Vec<String>,
        attached_domain: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub records: Vec<CompanyRecord>,
    pub conflicts: Vec<MergeConflict>,
    pub stats: MergeStats,
}

impl MergeOutcome {
    /// Domain-reuse conflicts as `{domain: [names...]}`.
    pub fn domain_conflict_map(&self) -> BTreeMap<String, Vec<String>> {
        self.conflicts
            .iter()
            .filter_map(|c| match c {
                MergeConflict::DomainReuse { domain, names } => Some((domain.clone(), names.clone())),
                MergeConflict::NameCollision { .. } => None,
            })
            .collect()
    }
}

/// Why two records were joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeEdge {
    SameKey,
    NameOnlyAttach,
}

fn has_identity_website(record: &CompanyRecord) -> bool {
    record.website.as_deref().and_then(identity_domain).is_some()
}

/// Merge precedence: source priority, then a real website, then the
/// lexicographically earlier name. `Less` means `a` wins.
pub fn merge_precedence(a: &CompanyRecord, b: &CompanyRecord) -> Ordering {
    a.validation_source
        .cmp(&b.validation_source)
        .then_with(|| has_identity_website(b).cmp(&has_identity_website(a)))
        .then_with(|| a.name.cmp(&b.name))
}

/// Deduplicates `records` into one canonical record per company.
///
/// Records are keyed on `(domain, normalized_name)` when they carry a usable
/// domain and on `normalized_name` alone otherwise. Identical keys merge. A
/// shared domain under different names is reported, never merged.
pub fn merge_records(records: Vec<CompanyRecord>, multi_progress: Option<&MultiProgress>) -> MergeOutcome {
    let logger = PipelineLogger::new(PipelineStage::Merge);
    let mut stats = MergeStats {
        input_records: records.len(),
        ..Default::default()
    };

    logger.log_phase("Tagging records", None);
    let mut kept: Vec<CompanyRecord> = Vec::with_capacity(records.len());
    for mut record in records {
        tag_record(&mut record);
        if record.normalized_name.is_empty() {
            warn!(
                "[MERGE] dropping record with blank name {:?} from source {}",
                record.name, record.validation_source
            );
            stats.dropped_blank_names += 1;
            continue;
        }
        kept.push(record);
    }
    logger.log_dropped(stats.dropped_blank_names, "blank company name");

    logger.log_phase("Grouping by key", Some(&format!("{} records", kept.len())));
    let mut domain_keyed: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    let mut name_only: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in kept.iter().enumerate() {
        match &record.domain {
            Some(domain) => domain_keyed
                .entry((domain.clone(), record.normalized_name.clone()))
                .or_default()
                .push(idx),
            None => name_only.entry(record.normalized_name.clone()).or_default().push(idx),
        }
    }

    let mut conflicts = detect_domain_reuse(&kept, &domain_keyed);
    stats.domain_conflicts = conflicts.len();

    let mut graph: UnGraph<usize, MergeEdge> = UnGraph::new_undirected();
    let nodes: Vec<NodeIndex> = (0..kept.len()).map(|idx| graph.add_node(idx)).collect();
    for members in domain_keyed.values() {
        link_to_first(&mut graph, &nodes, members, MergeEdge::SameKey);
    }

    // Domain-keyed classes per normalized name, for attaching name-only records.
    let mut classes_by_name: BTreeMap<&str, Vec<(&str, &Vec<usize>)>> = BTreeMap::new();
    for ((domain, name), members) in &domain_keyed {
        classes_by_name
            .entry(name.as_str())
            .or_default()
            .push((domain.as_str(), members));
    }

    let pb = add_bar(multi_progress, name_only.len() as u64, "Attaching name-only records...");
    let mut attached_domains: BTreeMap<String, String> = BTreeMap::new();
    for (name, members) in &name_only {
        if let Some(pb) = &pb {
            pb.inc(1);
        }
        match classes_by_name.get(name.as_str()) {
            None => link_to_first(&mut graph, &nodes, members, MergeEdge::SameKey),
            Some(classes) => {
                let (domain, target) = if classes.len() == 1 {
                    classes[0]
                } else {
                    let chosen = strongest_class(&kept, classes);
                    warn!(
                        "[MERGE] {} name-only record(s) named '{}' match {} domains; attaching to {}",
                        members.len(),
                        name,
                        classes.len(),
                        chosen.0
                    );
                    attached_domains.insert(name.clone(), chosen.0.to_string());
                    chosen
                };
                debug!("[MERGE] attaching '{}' name-only records to {}", name, domain);
                for &idx in members {
                    graph.add_edge(nodes[target[0]], nodes[idx], MergeEdge::NameOnlyAttach);
                }
            }
        }
    }
    if let Some(pb) = &pb {
        pb.finish_with_message("Name-only records attached");
    }

    for (name, classes) in &classes_by_name {
        if classes.len() < 2 {
            continue;
        }
        let names: BTreeSet<String> = classes
            .iter()
            .flat_map(|(_, members)| members.iter().map(|&i| kept[i].name.clone()))
            .collect();
        conflicts.push(MergeConflict::NameCollision {
            normalized_name: name.to_string(),
            domains: classes.iter().map(|(d, _)| d.to_string()).collect(),
            names: names.into_iter().collect(),
            attached_domain: attached_domains.get(*name).cloned(),
        });
        stats.name_collisions += 1;
    }

    info!(
        "[MERGE] graph built: {} nodes, {} edges, {} components",
        graph.node_count(),
        graph.edge_count(),
        connected_components(&graph)
    );

    logger.log_phase("Merging equivalence classes", None);
    let components = collect_components(&graph);
    let mut output = Vec::with_capacity(components.len());
    for mut members in components {
        members.sort_by(|&a, &b| merge_precedence(&kept[a], &kept[b]).then(a.cmp(&b)));
        if members.len() > 1 {
            stats.groups_merged += 1;
        }
        let group: Vec<&CompanyRecord> = members.iter().map(|&i| &kept[i]).collect();
        output.push(merge_group(&group));
    }

    stats.output_records = output.len();
    logger.log_conflicts(stats.domain_conflicts, stats.name_collisions);
    logger.log_completion(stats.input_records, stats.output_records);

    MergeOutcome {
        records: output,
        conflicts,
        stats,
    }
}

fn link_to_first(graph: &mut UnGraph<usize, MergeEdge>, nodes: &[NodeIndex], members: &[usize], edge: MergeEdge) {
    if let Some((&first, rest)) = members.split_first() {
        for &idx in rest {
            graph.add_edge(nodes[first], nodes[idx], edge);
        }
    }
}

fn detect_domain_reuse(
    records: &[CompanyRecord],
    domain_keyed: &BTreeMap<(String, String), Vec<usize>>,
) -> Vec<MergeConflict> {
    let mut by_domain: BTreeMap<&str, Vec<&Vec<usize>>> = BTreeMap::new();
    for ((domain, _), members) in domain_keyed {
        by_domain.entry(domain.as_str()).or_default().push(members);
    }

    let mut conflicts = Vec::new();
    for (domain, classes) in by_domain {
        if classes.len() < 2 {
            continue;
        }
        let names: BTreeSet<String> = classes
            .iter()
            .flat_map(|members| members.iter().map(|&i| records[i].name.clone()))
            .collect();
        let names: Vec<String> = names.into_iter().collect();
        warn!("[MERGE] domain-reuse conflict on {}: {:?}", domain, names);
        conflicts.push(MergeConflict::DomainReuse {
            domain: domain.to_string(),
            names,
        });
    }
    conflicts
}

/// The class whose best member outranks every other class's best member.
fn strongest_class<'a>(records: &[CompanyRecord], classes: &[(&'a str, &'a Vec<usize>)]) -> (&'a str, &'a Vec<usize>) {
    let best_of = |members: &Vec<usize>| -> usize {
        let mut best = members[0];
        for &idx in &members[1..] {
            if merge_precedence(&records[idx], &records[best]) == Ordering::Less {
                best = idx;
            }
        }
        best
    };

    let mut chosen = classes[0];
    for &candidate in &classes[1..] {
        let ordering = merge_precedence(&records[best_of(candidate.1)], &records[best_of(chosen.1)]);
        if ordering == Ordering::Less || (ordering == Ordering::Equal && candidate.0 < chosen.0) {
            chosen = candidate;
        }
    }
    chosen
}

/// Connected components ordered by their earliest member, members in input
/// order.
fn collect_components(graph: &UnGraph<usize, MergeEdge>) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.node_count()];
    let mut components = Vec::new();

    for node_idx in graph.node_indices() {
        if visited[node_idx.index()] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![node_idx];
        while let Some(current) = stack.pop() {
            if visited[current.index()] {
                continue;
            }
            visited[current.index()] = true;
            component.push(graph[current]);
            for neighbor in graph.neighbors(current) {
                if !visited[neighbor.index()] {
                    stack.push(neighbor);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}

/// Folds a precedence-sorted group into its first member. Fields empty in the
/// winner are filled from the next record that has them.
fn merge_group(group: &[&CompanyRecord]) -> CompanyRecord {
    let mut merged = group[0].clone();

    for other in &group[1..] {
        if !has_identity_website(&merged) && has_identity_website(other) {
            merged.website = other.website.clone();
        } else {
            fill_if_empty(&mut merged.website, &other.website);
        }
        fill_if_empty(&mut merged.city, &other.city);
        fill_if_empty(&mut merged.address, &other.address);
        fill_if_empty(&mut merged.place_id, &other.place_id);
        fill_if_empty(&mut merged.focus_area, &other.focus_area);
        fill_if_empty(&mut merged.description, &other.description);

        if merged.coordinates().is_none() {
            if let Some((lat, lng)) = other.coordinates() {
                merged.latitude = Some(lat);
                merged.longitude = Some(lng);
                if merged.location_confidence.is_none() {
                    merged.location_confidence = other.location_confidence;
                }
            }
        }
        if merged.stage.is_unknown() && !other.stage.is_unknown() {
            merged.stage = other.stage;
            merged.stage_confidence = other.stage_confidence;
            merged.stage_method = other.stage_method.clone();
        }
        merged.geofence_exempt |= other.geofence_exempt;
    }

    merged.data_sources = group.iter().map(|r| r.data_sources.max(1)).sum();
    merged.domain = merged.website.as_deref().and_then(identity_domain);
    if !has_text(&merged.website) {
        merged.website = None;
    }
    merged.refresh_quality_score();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{Stage, ValidationSource};

    fn rec(name: &str, source: ValidationSource) -> CompanyRecord {
        CompanyRecord::new(name, source)
    }

    #[test]
    fn test_bpg_and_wiki_records_merge() {
        let input = vec![
            rec("Acme Bio", ValidationSource::Bpg).with_website("https://acme.com"),
            rec("Acme Bio Inc", ValidationSource::Wikipedia).with_city("Berkeley"),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records.len(), 1);
        let merged = &outcome.records[0];
        assert_eq!(merged.name, "Acme Bio");
        assert_eq!(merged.website.as_deref(), Some("https://acme.com"));
        assert_eq!(merged.city.as_deref(), Some("Berkeley"));
        assert_eq!(merged.data_sources, 2);
        assert_eq!(merged.validation_source, ValidationSource::Bpg);
        assert_eq!(outcome.stats.groups_merged, 1);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_domain_reuse_kept_apart_and_reported() {
        let input = vec![
            rec("Acme Bio", ValidationSource::Bpg).with_website("https://sharedincubator.com"),
            rec("Zenith Pharma", ValidationSource::Bpg).with_website("https://www.sharedincubator.com/zenith"),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records.len(), 2);
        let map = outcome.domain_conflict_map();
        assert_eq!(
            map.get("sharedincubator.com"),
            Some(&vec!["Acme Bio".to_string(), "Zenith Pharma".to_string()])
        );
        assert_eq!(outcome.stats.domain_conflicts, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = vec![
            rec("Acme Bio", ValidationSource::Bpg).with_website("https://acme.com"),
            rec("Acme Bio Inc", ValidationSource::Wikipedia).with_city("Berkeley"),
            rec("Zenith Pharma", ValidationSource::Web).with_city("Oakland"),
            rec("Nova Therapeutics", ValidationSource::Wikipedia).with_website("https://nova.bio"),
            rec("Nova Therapeutics", ValidationSource::Bpg).with_website("https://novatx.com"),
        ];
        let first = merge_records(input, None);
        let second = merge_records(first.records.clone(), None);
        assert_eq!(first.records, second.records);
        assert_eq!(second.stats.groups_merged, 0);
    }

    #[test]
    fn test_blank_names_dropped_before_grouping() {
        let input = vec![
            rec("", ValidationSource::Bpg),
            rec("   ", ValidationSource::Web),
            rec("!!!", ValidationSource::Web),
            rec("Solo Labs", ValidationSource::Web),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.stats.dropped_blank_names, 3);
        assert_eq!(outcome.stats.input_records, 4);
    }

    #[test]
    fn test_name_only_singleton_survives() {
        let outcome = merge_records(vec![rec("Quiet Bio", ValidationSource::Web)], None);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].data_sources, 1);
    }

    #[test]
    fn test_equal_priority_prefers_real_website_then_name() {
        let input = vec![
            rec("Acme Bio", ValidationSource::Bpg),
            rec("Acme Bio Inc", ValidationSource::Bpg).with_website("https://acme.com"),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].name, "Acme Bio Inc");

        let input = vec![
            rec("Beta Labs Inc", ValidationSource::Web),
            rec("Beta Labs", ValidationSource::Web),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records[0].name, "Beta Labs");
    }

    #[test]
    fn test_aggregator_website_not_used_as_key() {
        let input = vec![
            rec("Acme Bio", ValidationSource::Web).with_website("https://www.linkedin.com/company/acme"),
            rec("Zenith Pharma", ValidationSource::Web).with_website("https://www.linkedin.com/company/zenith"),
            rec("Acme Bio", ValidationSource::Bpg).with_website("https://acme.com"),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.conflicts.is_empty());
        let acme = outcome.records.iter().find(|r| r.normalized_name == "acme bio").unwrap();
        assert_eq!(acme.website.as_deref(), Some("https://acme.com"));
        assert_eq!(acme.data_sources, 2);
    }

    #[test]
    fn test_name_collision_attaches_to_strongest_class() {
        let input = vec![
            rec("Acme Bio", ValidationSource::Wikipedia).with_website("https://acme.com"),
            rec("Acme Bio", ValidationSource::Bpg).with_website("https://acmebio.io"),
            rec("Acme Bio", ValidationSource::Web).with_city("Berkeley"),
        ];
        let outcome = merge_records(input, None);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.stats.name_collisions, 1);
        match &outcome.conflicts[0] {
            MergeConflict::NameCollision { domains, attached_domain, .. } => {
                assert_eq!(domains.len(), 2);
                assert_eq!(attached_domain.as_deref(), Some("acmebio.io"));
            }
            other => panic!("unexpected conflict {:?}", other),
        }
        let io = outcome.records.iter().find(|r| r.domain.as_deref() == Some("acmebio.io")).unwrap();
        assert_eq!(io.city.as_deref(), Some("Berkeley"));
        assert_eq!(io.data_sources, 2);
    }

    #[test]
    fn test_waterfall_never_overwrites_winner() {
        let mut winner = rec("Acme Bio", ValidationSource::Manual).with_city("Emeryville");
        winner.stage = Stage::Platform;
        winner.stage_confidence = 0.9;
        let mut loser = rec("Acme Bio", ValidationSource::Web).with_city("Berkeley");
        loser.stage = Stage::Preclinical;
        loser.address = Some("1 Main St".to_string());
        let outcome = merge_records(vec![loser, winner], None);
        let merged = &outcome.records[0];
        assert_eq!(merged.city.as_deref(), Some("Emeryville"));
        assert_eq!(merged.stage, Stage::Platform);
        assert_eq!(merged.address.as_deref(), Some("1 Main St"));
    }

    #[test]
    fn test_output_order_follows_first_appearance() {
        let input = vec![
            rec("Zenith Pharma", ValidationSource::Web),
            rec("Acme Bio", ValidationSource::Web),
            rec("Zenith Pharma Inc", ValidationSource::Bpg),
        ];
        let outcome = merge_records(input, None);
        let names: Vec<&str> = outcome.records.iter().map(|r| r.normalized_name.as_str()).collect();
        assert_eq!(names, vec!["zenith pharma", "acme bio"]);
    }
}
