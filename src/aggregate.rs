// src/aggregate.rs

use csv::WriterBuilder;
use serde::Serialize;

use crate::config::{ArraySource, CoverageKeyStrategy, PipelineConfig};
use crate::coverage::{depth_stats, CoverageSource};
use crate::error::{KocovError, Result};
use crate::regions::RegionsByTaxon;
use crate::taxdb::TaxonTable;
use crate::types::{CoverageStatus, Region, RegionCoverage};

/// Coverage-annotated regions of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCoverage {
    pub sample: String,
    pub rows: Vec<RegionCoverage>,
}

const COVERAGE_HEADER: [&str; 9] = [
    "taxid",
    "ko",
    "name",
    "start",
    "stop",
    "seq_length",
    "avg_depth",
    "max_depth",
    "desc",
];

#[derive(Serialize)]
struct CoverageRow<'a> {
    taxid: u32,
    ko: &'a str,
    name: &'a str,
    start: u64,
    stop: u64,
    seq_length: u64,
    avg_depth: f64,
    max_depth: f64,
    // free text stays last
    desc: &'a str,
}

impl SampleCoverage {
    pub fn sentinel_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_sentinel()).count()
    }

    /// Render as CSV with `desc` as the final column. The header is written
    /// even when there are no rows.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        writer.write_record(COVERAGE_HEADER)?;
        for row in &self.rows {
            let reg = &row.region;
            writer.serialize(CoverageRow {
                taxid: row.taxon_id,
                ko: &reg.ortholog_id,
                name: &reg.name,
                start: reg.start,
                stop: reg.stop,
                seq_length: reg.length(),
                avg_depth: row.avg_depth,
                max_depth: row.max_depth,
                desc: &reg.description,
            })?;
        }
        writer.into_inner().map_err(|e| {
            KocovError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
        })
    }
}

/// Reduces per-base depth arrays to per-region mean and max depth.
///
/// Regions whose coverage cannot be computed get `-1` for both depths and a
/// `CoverageStatus` saying why; each such case is logged as a warning.
pub struct CoverageAggregator<'a> {
    config: &'a PipelineConfig,
    taxa: &'a TaxonTable,
}

impl<'a> CoverageAggregator<'a> {
    pub fn new(config: &'a PipelineConfig, taxa: &'a TaxonTable) -> Self {
        Self { config, taxa }
    }

    /// Annotate every region of every taxon for one sample.
    ///
    /// `secondary` is the sample's second array collection, used by taxa
    /// whose strategy reads from it.
    pub fn aggregate(
        &self,
        sample: &str,
        regions: &RegionsByTaxon,
        primary: &mut dyn CoverageSource,
        mut secondary: Option<&mut dyn CoverageSource>,
    ) -> Result<SampleCoverage> {
        let mut rows = Vec::with_capacity(regions.values().map(Vec::len).sum());

        for (&taxon_id, taxon_regions) in regions {
            let strategy = self.config.strategy_for(taxon_id);
            match strategy.source() {
                ArraySource::Primary => {
                    self.annotate_taxon(sample, taxon_id, taxon_regions, strategy, &mut *primary, &mut rows)?
                }
                ArraySource::Secondary => match secondary.as_mut() {
                    Some(source) => self.annotate_taxon(
                        sample,
                        taxon_id,
                        taxon_regions,
                        strategy,
                        &mut **source,
                        &mut rows,
                    )?,
                    None => {
                        log::warn!(
                            "[{sample}] taxon {taxon_id}: no secondary coverage collection, {} region(s) left at -1",
                            taxon_regions.len()
                        );
                        sentinel_all(&mut rows, taxon_id, taxon_regions, CoverageStatus::MissingArray);
                    }
                },
            }
        }

        let out = SampleCoverage {
            sample: sample.to_string(),
            rows,
        };
        log::info!(
            "[{}] {} region(s), {} without coverage",
            sample,
            out.rows.len(),
            out.sentinel_count()
        );
        Ok(out)
    }

    fn annotate_taxon(
        &self,
        sample: &str,
        taxon_id: u32,
        regions: &[Region],
        strategy: &CoverageKeyStrategy,
        source: &mut dyn CoverageSource,
        rows: &mut Vec<RegionCoverage>,
    ) -> Result<()> {
        match strategy {
            CoverageKeyStrategy::ByScaffold => self.by_scaffold(sample, taxon_id, regions, source, rows),
            CoverageKeyStrategy::ByRegionName { .. } => {
                by_region_name(sample, taxon_id, regions, strategy, source, rows)
            }
        }
    }

    fn by_scaffold(
        &self,
        sample: &str,
        taxon_id: u32,
        regions: &[Region],
        source: &mut dyn CoverageSource,
        rows: &mut Vec<RegionCoverage>,
    ) -> Result<()> {
        let Some(key) = self.taxa.scaffold(taxon_id) else {
            log::warn!(
                "[{sample}] taxon {taxon_id}: no scaffold key, {} region(s) left at -1",
                regions.len()
            );
            sentinel_all(rows, taxon_id, regions, CoverageStatus::MissingKey);
            return Ok(());
        };
        let Some(depths) = source.depths(key)? else {
            log::warn!(
                "[{sample}] taxon {taxon_id}: no coverage array '{key}', {} region(s) left at -1",
                regions.len()
            );
            sentinel_all(rows, taxon_id, regions, CoverageStatus::MissingArray);
            return Ok(());
        };
        for region in regions {
            rows.push(region_coverage(sample, taxon_id, region, depths));
        }
        Ok(())
    }
}

fn by_region_name(
    sample: &str,
    taxon_id: u32,
    regions: &[Region],
    strategy: &CoverageKeyStrategy,
    source: &mut dyn CoverageSource,
    rows: &mut Vec<RegionCoverage>,
) -> Result<()> {
    for region in regions {
        let Some(key) = strategy.region_key(&region.name) else {
            log::warn!(
                "[{sample}] taxon {taxon_id}: no array key in region name '{}'",
                region.name
            );
            rows.push(RegionCoverage::sentinel(taxon_id, region.clone(), CoverageStatus::MissingKey));
            continue;
        };
        match source.depths(&key)? {
            Some(depths) => rows.push(region_coverage(sample, taxon_id, region, depths)),
            None => {
                log::warn!(
                    "[{sample}] taxon {taxon_id}: no coverage array '{key}' for region '{}'",
                    region.name
                );
                rows.push(RegionCoverage::sentinel(
                    taxon_id,
                    region.clone(),
                    CoverageStatus::MissingArray,
                ));
            }
        }
    }
    Ok(())
}

fn region_coverage(sample: &str, taxon_id: u32, region: &Region, depths: &[f64]) -> RegionCoverage {
    match depth_stats(depths, region.start, region.stop) {
        Some((avg, max)) => RegionCoverage::computed(taxon_id, region.clone(), avg, max),
        None => {
            log::warn!(
                "[{sample}] taxon {taxon_id}: region '{}' [{}, {}) is empty or outside an array of length {}",
                region.name,
                region.start,
                region.stop,
                depths.len()
            );
            RegionCoverage::sentinel(taxon_id, region.clone(), CoverageStatus::InvalidSlice)
        }
    }
}

fn sentinel_all(
    rows: &mut Vec<RegionCoverage>,
    taxon_id: u32,
    regions: &[Region],
    status: CoverageStatus,
) {
    rows.extend(
        regions
            .iter()
            .map(|r| RegionCoverage::sentinel(taxon_id, r.clone(), status)),
    );
}
