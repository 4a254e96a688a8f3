// src/regions.rs

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use ahash::AHashMap;

use crate::annotation::{AnnotationFeature, NAME_ATTRIBUTE};
use crate::error::{KocovError, Result};
use crate::types::{Region, ResolvedHit};

pub const REGION_TABLE_PREFIX: &str = "identified_regions_";
pub const REGION_TABLE_SUFFIX: &str = ".tsv";
pub const REGION_TABLE_HEADER: &str = "ko\tname\tstart\tstop\tdesc";

/// Regions of one taxon per taxon id, in ascending taxon order.
pub type RegionsByTaxon = BTreeMap<u32, Vec<Region>>;

/// File name of the region table for `taxon_id`.
pub fn region_table_name(taxon_id: u32) -> String {
    format!("{REGION_TABLE_PREFIX}{taxon_id}{REGION_TABLE_SUFFIX}")
}

/// Regions grouped by ortholog. Groups keep the order in which their
/// ortholog first appears among the resolved hits; regions inside a group
/// keep annotation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTable {
    groups: Vec<(String, Vec<Region>)>,
}

impl RegionTable {
    pub fn regions_for(&self, ortholog_id: &str) -> Option<&[Region]> {
        self.groups
            .iter()
            .find(|(ko, _)| ko == ortholog_id)
            .map(|(_, regions)| regions.as_slice())
    }

    pub fn orthologs(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(ko, _)| ko.as_str())
    }

    /// All regions, group by group.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.groups.iter().flat_map(|(_, regions)| regions.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render as a `ko, name, start, stop, desc` TSV.
    pub fn to_tsv(&self) -> String {
        let mut output = String::new();
        output.push_str(REGION_TABLE_HEADER);
        output.push('\n');
        for reg in self.regions() {
            // Writing into a String cannot fail.
            let _ = writeln!(
                output,
                "{}\t{}\t{}\t{}\t{}",
                reg.ortholog_id, reg.name, reg.start, reg.stop, reg.description
            );
        }
        output
    }
}

/// Builds the region table of one taxon from a single pass over its
/// annotation records.
pub struct RegionLocator {
    taxon_id: u32,
    groups: Vec<(String, Vec<Region>)>,
    /// `Name` attribute -> indices into `groups`.
    name_index: AHashMap<String, Vec<usize>>,
}

impl RegionLocator {
    /// Index the resolved hits of `taxon_id`; hits of other taxa are ignored.
    pub fn new(taxon_id: u32, resolved: &[ResolvedHit]) -> Self {
        let mut groups: Vec<(String, Vec<Region>)> = Vec::new();
        let mut group_of: AHashMap<&str, usize> = AHashMap::new();
        let mut name_index: AHashMap<String, Vec<usize>> = AHashMap::new();

        for hit in resolved.iter().filter(|h| h.taxon_id == taxon_id) {
            let idx = *group_of.entry(hit.ortholog_id.as_str()).or_insert_with(|| {
                groups.push((hit.ortholog_id.clone(), Vec::new()));
                groups.len() - 1
            });
            let slots = name_index.entry(hit.subject_id.clone()).or_default();
            if !slots.contains(&idx) {
                slots.push(idx);
            }
        }

        log::debug!(
            "Taxon {}: {} ortholog(s) over {} subject id(s)",
            taxon_id,
            groups.len(),
            name_index.len()
        );

        Self {
            taxon_id,
            groups,
            name_index,
        }
    }

    pub fn taxon_id(&self) -> u32 {
        self.taxon_id
    }

    /// Feed one annotation record. Returns how many regions it produced.
    pub fn observe(&mut self, feature: &AnnotationFeature) -> Result<usize> {
        if !feature.is_cds() {
            return Ok(0);
        }
        let attrs = feature.attribute_map()?;
        let Some(name) = attrs.get(NAME_ATTRIBUTE) else {
            return Ok(0);
        };
        let Some(slots) = self.name_index.get(*name) else {
            return Ok(0);
        };

        for &idx in slots {
            let (ko, regions) = &mut self.groups[idx];
            regions.push(Region {
                ortholog_id: ko.clone(),
                name: name.to_string(),
                start: feature.start,
                stop: feature.stop,
                description: feature.attributes.clone(),
            });
        }
        Ok(slots.len())
    }

    pub fn finish(self) -> RegionTable {
        RegionTable {
            groups: self.groups,
        }
    }
}

/// Join an annotation stream against the resolved hits of one taxon.
pub fn locate_regions<I>(
    taxon_id: u32,
    annotations: I,
    resolved: &[ResolvedHit],
) -> Result<RegionTable>
where
    I: IntoIterator<Item = Result<AnnotationFeature>>,
{
    let locator = annotations.into_iter().try_fold(
        RegionLocator::new(taxon_id, resolved),
        |mut locator, feature| -> Result<RegionLocator> {
            locator.observe(&feature?)?;
            Ok(locator)
        },
    )?;
    let table = locator.finish();
    log::info!("Taxon {}: located {} region(s)", taxon_id, table.len());
    Ok(table)
}

/// Read one `identified_regions_*.tsv` table.
pub fn read_region_table<P: AsRef<Path>>(path: P) -> Result<Vec<Region>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut regions = Vec::new();

    for (idx, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line = line.trim_end_matches('\r');
        if idx == 0 {
            if line.trim_end() != REGION_TABLE_HEADER {
                return Err(KocovError::Parse(format!(
                    "{}: unexpected region table header '{}'",
                    path.display(),
                    line
                )));
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }

        // desc is last so any tab inside it stays part of the field
        let parts: Vec<&str> = line.splitn(5, '\t').collect();
        if parts.len() < 5 {
            return Err(KocovError::Parse(format!(
                "{}:{}: expected 5 columns, found {}",
                path.display(),
                idx + 1,
                parts.len()
            )));
        }
        let coord = |s: &str| {
            s.trim().parse::<u64>().map_err(|_| {
                KocovError::Parse(format!("{}:{}: invalid coordinate '{}'", path.display(), idx + 1, s))
            })
        };
        regions.push(Region {
            ortholog_id: parts[0].to_string(),
            name: parts[1].to_string(),
            start: coord(parts[2])?,
            stop: coord(parts[3])?,
            description: parts[4].to_string(),
        });
    }
    Ok(regions)
}

/// Load every region table in `dir`, keyed by the taxon id in its file name.
pub fn read_region_tables<P: AsRef<Path>>(dir: P) -> Result<RegionsByTaxon> {
    let mut tables = RegionsByTaxon::new();
    for path in region_table_paths(dir.as_ref())? {
        let taxon_id = taxon_from_table_path(&path)?;
        let regions = read_region_table(&path)?;
        log::debug!("Taxon {}: {} region(s) from {}", taxon_id, regions.len(), path.display());
        tables.insert(taxon_id, regions);
    }
    log::info!("Loaded region tables for {} taxa", tables.len());
    Ok(tables)
}

fn region_table_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let filename = path.file_name()?.to_str()?;
            if filename.starts_with(REGION_TABLE_PREFIX) && filename.ends_with(REGION_TABLE_SUFFIX) {
                Some(path)
            } else {
                None
            }
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn taxon_from_table_path(path: &Path) -> Result<u32> {
    let filename = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
    filename
        .strip_prefix(REGION_TABLE_PREFIX)
        .and_then(|s| s.strip_suffix(REGION_TABLE_SUFFIX))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| KocovError::Parse(format!("no taxon id in region table name '{filename}'")))
}
