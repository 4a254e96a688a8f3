// src/best_match.rs

use std::collections::BTreeMap;
use ahash::AHashMap;

use crate::error::Result;
use crate::top_hit::resolve_top_hit;
use crate::types::{Hit, ResolvedHit};

/// Hits of one taxon grouped by subject id, in subject-id order.
type SubjectGroups<'a> = BTreeMap<&'a str, Vec<&'a Hit>>;

/// Reduce a hit table to one resolved hit per `(taxon_id, subject_id)`.
///
/// Taxa come out in order of first appearance. Within a taxon, subjects whose
/// hits all name one ortholog are emitted first, then subjects with competing
/// orthologs; each block is sorted by subject id.
pub fn filter_best_matches(hits: &[Hit]) -> Result<Vec<ResolvedHit>> {
    let mut taxon_order: Vec<u32> = Vec::new();
    let mut by_taxon: AHashMap<u32, SubjectGroups<'_>> = AHashMap::new();

    for hit in hits {
        let groups = by_taxon.entry(hit.taxon_id).or_insert_with(|| {
            taxon_order.push(hit.taxon_id);
            BTreeMap::new()
        });
        groups.entry(hit.subject_id.as_str()).or_default().push(hit);
    }

    let mut resolved = Vec::new();
    for taxon_id in taxon_order {
        let groups = &by_taxon[&taxon_id];
        log::debug!("Resolving {} subject(s) of taxon {}", groups.len(), taxon_id);

        let (unambiguous, contested): (Vec<_>, Vec<_>) = groups
            .iter()
            .partition(|(_, subject_hits)| distinct_orthologs(subject_hits) == 1);

        for (_, subject_hits) in &unambiguous {
            resolved.push(resolve_top_hit(subject_hits)?.clone());
        }

        if !contested.is_empty() {
            log::debug!(
                "Taxon {}: {} subject(s) with competing orthologs",
                taxon_id,
                contested.len()
            );
        }
        for (_, subject_hits) in &contested {
            let finalists = reduce_contested(subject_hits);
            resolved.push(resolve_top_hit(&finalists)?.clone());
        }
    }

    Ok(resolved)
}

fn distinct_orthologs(hits: &[&Hit]) -> usize {
    let mut seen: Vec<&str> = Vec::with_capacity(2);
    for hit in hits {
        if !seen.contains(&hit.ortholog_id.as_str()) {
            seen.push(&hit.ortholog_id);
        }
    }
    seen.len()
}

/// Let each candidate ortholog compete on its own best evidence: keep its hits
/// at its minimum e-value, then among those its hits at its maximum identity.
/// Input order is preserved.
fn reduce_contested<'a>(hits: &[&'a Hit]) -> Vec<&'a Hit> {
    let mut min_e: AHashMap<&str, f64> = AHashMap::new();
    for hit in hits {
        min_e
            .entry(hit.ortholog_id.as_str())
            .and_modify(|e| {
                if hit.e_value < *e {
                    *e = hit.e_value;
                }
            })
            .or_insert(hit.e_value);
    }
    let at_min_e: Vec<&'a Hit> = hits
        .iter()
        .copied()
        .filter(|h| h.e_value == min_e[h.ortholog_id.as_str()])
        .collect();

    let mut max_id: AHashMap<&str, f64> = AHashMap::new();
    for hit in &at_min_e {
        max_id
            .entry(hit.ortholog_id.as_str())
            .and_modify(|p| {
                if hit.percent_identity > *p {
                    *p = hit.percent_identity;
                }
            })
            .or_insert(hit.percent_identity);
    }
    at_min_e
        .into_iter()
        .filter(|h| h.percent_identity == max_id[h.ortholog_id.as_str()])
        .collect()
}
