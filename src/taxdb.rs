//src/taxdb.rs

use std::io::Read;
use std::path::Path;
use ahash::AHashMap;
use csv::ReaderBuilder;
use serde::Deserialize;

use crate::error::Result;

/// Accession placeholder for taxa without a downloadable genome.
pub const ACCESSION_NOT_FOUND: &str = "NOTFOUND";

#[derive(Debug, Deserialize)]
struct AccessionRow {
    taxid: u32,
    accession_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScaffoldRow {
    taxid: u32,
    species: Option<String>,
}

/// Reference data of one taxon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonInfo {
    pub accession: Option<String>,
    /// Key of the taxon's coverage array; `None` when undefined.
    pub scaffold: Option<String>,
}

/// Taxa present in both reference tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonTable {
    taxa: AHashMap<u32, TaxonInfo>,
}

impl TaxonTable {
    pub fn from_entries<I: IntoIterator<Item = (u32, TaxonInfo)>>(entries: I) -> Self {
        Self {
            taxa: entries.into_iter().collect(),
        }
    }

    /// Convenience constructor mapping each taxon straight to a scaffold key.
    pub fn from_scaffolds<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self::from_entries(entries.into_iter().map(|(taxid, scaffold)| {
            (
                taxid,
                TaxonInfo {
                    accession: None,
                    scaffold: Some(scaffold.into()),
                },
            )
        }))
    }

    pub fn get(&self, taxon_id: u32) -> Option<&TaxonInfo> {
        self.taxa.get(&taxon_id)
    }

    /// Scaffold key of `taxon_id`, if the taxon is known and has one.
    pub fn scaffold(&self, taxon_id: u32) -> Option<&str> {
        self.taxa.get(&taxon_id)?.scaffold.as_deref()
    }

    pub fn accession(&self, taxon_id: u32) -> Option<&str> {
        self.taxa.get(&taxon_id)?.accession.as_deref()
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }
}

/// Parses the two headered CSV reference tables and joins them on `taxid`:
/// ```text
/// taxid,accession_number,...
/// taxid,species,...
/// ```
/// Only taxa listed in both tables are kept. An empty `species` cell leaves
/// the scaffold undefined; an empty or `NOTFOUND` accession leaves the
/// accession undefined.
pub fn parse_taxon_tables<P: AsRef<Path>, Q: AsRef<Path>>(
    accessions_path: P,
    scaffolds_path: Q,
) -> Result<TaxonTable> {
    let accessions = std::fs::File::open(accessions_path)?;
    let scaffolds = std::fs::File::open(scaffolds_path)?;
    read_taxon_tables(accessions, scaffolds)
}

pub fn read_taxon_tables<R1: Read, R2: Read>(accessions: R1, scaffolds: R2) -> Result<TaxonTable> {
    let mut accession_map: AHashMap<u32, Option<String>> = AHashMap::new();
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(accessions);
    for row in reader.deserialize::<AccessionRow>() {
        let row = row?;
        let accession = row
            .accession_number
            .filter(|a| !a.is_empty() && a != ACCESSION_NOT_FOUND);
        accession_map.insert(row.taxid, accession);
    }

    let mut taxa: AHashMap<u32, TaxonInfo> = AHashMap::new();
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(scaffolds);
    for row in reader.deserialize::<ScaffoldRow>() {
        let row = row?;
        if let Some(accession) = accession_map.get(&row.taxid) {
            taxa.insert(
                row.taxid,
                TaxonInfo {
                    accession: accession.clone(),
                    scaffold: row.species.filter(|s| !s.is_empty()),
                },
            );
        }
    }

    log::info!("Loaded reference data for {} taxa", taxa.len());
    Ok(TaxonTable { taxa })
}
