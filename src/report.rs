//! Plain-text rendering of discovery output.

use crate::discovery::DiscoveryReport;
use crate::store::RelationshipDetail;

/// One line per relationship, in the order given.
pub fn render_relationships(details: &[RelationshipDetail]) -> String {
    if details.is_empty() {
        return "No relationships.".to_string();
    }

    let mut lines = Vec::with_capacity(details.len());
    for detail in details {
        let rel = &detail.relationship;
        let origin = rel
            .inference_method
            .map(|m| m.as_str())
            .unwrap_or_else(|| rel.relationship_type.as_str());

        let mut line = format!(
            "{} -> {} [{}] {} ({:.2})",
            detail.source, detail.target, rel.cardinality, origin, rel.confidence
        );
        if let Some(metrics) = &detail.metrics {
            line.push_str(&format!(
                " match_rate={:.2} matched={}",
                metrics.match_rate, metrics.matched_count
            ));
        }
        if !rel.is_validated {
            line.push_str(" unvalidated");
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Summary of a discovery run.
pub fn render_summary(report: &DiscoveryReport) -> String {
    let fk = &report.fk;
    let pk = &report.pk_match;
    let rejected = &pk.rejections;

    [
        format!(
            "Legacy pattern matching: {}",
            if report.legacy_pattern_matching { "on" } else { "off" }
        ),
        format!(
            "Phase 1: {} foreign keys ({} from column features, {} from constraints)",
            fk.fk_relationships, fk.from_column_features, fk.from_constraints
        ),
        format!(
            "  skipped: {} manual, {} unresolved; {} cardinality fallbacks",
            fk.skipped_manual, fk.skipped_unresolved, fk.cardinality_fallbacks
        ),
        format!(
            "Phase 2: {} inferred from {} candidates ({} pairs tested)",
            pk.inferred_relationships, pk.candidates_evaluated, pk.pairs_tested
        ),
        format!(
            "  rejected: {} orphans, {} reverse orphans, {} small integer, {} no match, {} validator errors",
            rejected.orphans,
            rejected.reverse_orphans,
            rejected.small_integer,
            rejected.no_match,
            rejected.validator_error
        ),
        format!("Total: {} relationships", report.total_relationships()),
    ]
    .join("\n")
}
