//! Cardinality inference from join statistics.

use super::thresholds::cardinality::REPETITION_TOLERANCE;
use crate::datasource::JoinAnalysis;
use crate::model::Cardinality;

/// Infer the cardinality of `source -> target` from join statistics.
///
/// Compares inner-join rows against matched rows on each side. A side whose
/// matched rows fan out into more join rows than [`REPETITION_TOLERANCE`]
/// allows is repeated. Without any matched rows the result is unknown.
pub fn infer_cardinality(analysis: &JoinAnalysis) -> Cardinality {
    if analysis.join_count <= 0 || analysis.source_matched <= 0 || analysis.target_matched <= 0 {
        return Cardinality::Unknown;
    }

    let join = analysis.join_count as f64;
    let per_source = join / analysis.source_matched as f64;
    let per_target = join / analysis.target_matched as f64;

    // Several join rows per matched target row means many sources share it.
    Cardinality::from_repetition(
        per_target > REPETITION_TOLERANCE,
        per_source > REPETITION_TOLERANCE,
    )
}
