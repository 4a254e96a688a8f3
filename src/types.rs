//src/types.rs

/// One row of a similarity-search result table.
///
/// `fields` holds the row exactly as it was read, so resolved rows can be
/// written back with every original column intact.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub taxon_id: u32,
    pub subject_id: String,
    pub ortholog_id: String,
    pub e_value: f64,
    pub percent_identity: f64,
    pub fields: Vec<String>,
}

impl Hit {
    /// Build a hit whose raw row is the canonical
    /// `taxid, sseqid, ko, evalue, pident` column order.
    pub fn new(
        taxon_id: u32,
        subject_id: &str,
        ortholog_id: &str,
        e_value: f64,
        percent_identity: f64,
    ) -> Self {
        Self {
            taxon_id,
            subject_id: subject_id.to_string(),
            ortholog_id: ortholog_id.to_string(),
            e_value,
            percent_identity,
            fields: vec![
                taxon_id.to_string(),
                subject_id.to_string(),
                ortholog_id.to_string(),
                e_value.to_string(),
                percent_identity.to_string(),
            ],
        }
    }
}

/// A hit chosen as the single ortholog assignment of its `(taxon_id, subject_id)`.
pub type ResolvedHit = Hit;

/// One genomic span assigned to an ortholog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub ortholog_id: String,
    pub name: String,
    pub start: u64,
    pub stop: u64,
    /// Raw attribute string of the annotation record.
    pub description: String,
}

impl Region {
    pub fn length(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }
}

/// Why a region did or did not get depth values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageStatus {
    Computed,
    /// No array key could be resolved for the taxon or region.
    MissingKey,
    /// A key was resolved but the sample holds no array under it.
    MissingArray,
    /// `start >= stop` or `stop` beyond the end of the array.
    InvalidSlice,
}

/// Depth value written when coverage was not computed.
pub const DEPTH_SENTINEL: f64 = -1.0;

/// A region with its depth summary for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCoverage {
    pub taxon_id: u32,
    pub region: Region,
    pub avg_depth: f64,
    pub max_depth: f64,
    pub status: CoverageStatus,
}

impl RegionCoverage {
    pub fn computed(taxon_id: u32, region: Region, avg_depth: f64, max_depth: f64) -> Self {
        Self {
            taxon_id,
            region,
            avg_depth,
            max_depth,
            status: CoverageStatus::Computed,
        }
    }

    pub fn sentinel(taxon_id: u32, region: Region, status: CoverageStatus) -> Self {
        Self {
            taxon_id,
            region,
            avg_depth: DEPTH_SENTINEL,
            max_depth: DEPTH_SENTINEL,
            status,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.status != CoverageStatus::Computed
    }
}
