// src/top_hit.rs

use crate::error::{KocovError, Result};
use crate::types::Hit;

/// Pick the best-supported hit among hits that share one subject id.
///
/// The minimum e-value is found first and only hits at exactly that value
/// stay in play (no epsilon). Among those the highest percent identity wins.
/// Hits tied on both metrics resolve to the earliest one in `hits`.
pub fn resolve_top_hit<'a>(hits: &[&'a Hit]) -> Result<&'a Hit> {
    let first = hits.first().ok_or_else(|| {
        KocovError::ContractViolation("top hit requested for an empty hit group".into())
    })?;

    if let Some(other) = hits.iter().find(|h| h.subject_id != first.subject_id) {
        return Err(KocovError::ContractViolation(format!(
            "hit group mixes subject ids '{}' and '{}' (taxon {})",
            first.subject_id, other.subject_id, first.taxon_id
        )));
    }

    let min_e = hits
        .iter()
        .map(|h| h.e_value)
        .min_by(f64::total_cmp)
        .unwrap_or(first.e_value);

    // Strict `>` keeps the first of equally good hits.
    let mut best: Option<&'a Hit> = None;
    for &hit in hits.iter().filter(|h| h.e_value == min_e) {
        match best {
            Some(b) if hit.percent_identity.total_cmp(&b.percent_identity).is_gt() => {
                best = Some(hit)
            }
            None => best = Some(hit),
            _ => {}
        }
    }

    best.ok_or_else(|| {
        KocovError::ContractViolation(format!(
            "no hit at the minimum e-value for subject '{}'",
            first.subject_id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_evalue_wins_over_identity() {
        let a = Hit::new(1, "g1", "K1", 1e-10, 80.0);
        let b = Hit::new(1, "g1", "K1", 1e-5, 100.0);
        let best = resolve_top_hit(&[&b, &a]).unwrap();
        assert_eq!(best, &a);
    }

    #[test]
    fn identity_breaks_evalue_ties() {
        let a = Hit::new(1, "g1", "K1", 1e-10, 80.0);
        let b = Hit::new(1, "g1", "K2", 1e-10, 95.5);
        let c = Hit::new(1, "g1", "K3", 1e-3, 99.9);
        let best = resolve_top_hit(&[&a, &b, &c]).unwrap();
        assert_eq!(best.ortholog_id, "K2");
    }

    #[test]
    fn full_ties_keep_input_order() {
        let a = Hit::new(1, "g1", "K7", 0.0, 90.0);
        let b = Hit::new(1, "g1", "K3", 0.0, 90.0);
        assert_eq!(resolve_top_hit(&[&a, &b]).unwrap().ortholog_id, "K7");
        assert_eq!(resolve_top_hit(&[&b, &a]).unwrap().ortholog_id, "K3");
    }

    #[test]
    fn single_hit_is_returned() {
        let a = Hit::new(4, "x", "K9", 2.5e-30, 41.0);
        assert_eq!(resolve_top_hit(&[&a]).unwrap(), &a);
    }

    #[test]
    fn mixed_subjects_are_rejected() {
        let a = Hit::new(1, "g1", "K1", 1e-10, 80.0);
        let b = Hit::new(1, "g2", "K1", 1e-10, 80.0);
        let err = resolve_top_hit(&[&a, &b]).unwrap_err();
        assert!(matches!(err, KocovError::ContractViolation(_)));
        assert!(err.to_string().contains("g2"));
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(
            resolve_top_hit(&[]),
            Err(KocovError::ContractViolation(_))
        ));
    }
}
