// src/hits.rs

use std::fs;
use std::io::Read;
use std::path::Path;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::{KocovError, Result};
use crate::types::Hit;

pub const TAXID_COL: &str = "taxid";
pub const SSEQID_COL: &str = "sseqid";
pub const KO_COL: &str = "ko";
pub const EVALUE_COL: &str = "evalue";
pub const PIDENT_COL: &str = "pident";

/// A headered hit table. Columns beyond the five required ones are kept in
/// each hit's `fields` and written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct HitTable {
    pub header: Vec<String>,
    pub hits: Vec<Hit>,
}

struct Columns {
    taxid: usize,
    sseqid: usize,
    ko: usize,
    evalue: usize,
    pident: usize,
}

impl Columns {
    fn locate(header: &StringRecord, origin: &Path) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| KocovError::MissingColumn {
                    path: origin.to_path_buf(),
                    column: name.to_string(),
                })
        };
        Ok(Self {
            taxid: find(TAXID_COL)?,
            sseqid: find(SSEQID_COL)?,
            ko: find(KO_COL)?,
            evalue: find(EVALUE_COL)?,
            pident: find(PIDENT_COL)?,
        })
    }
}

impl HitTable {
    /// Header used when a table is built from hits created in code.
    pub fn canonical_header() -> Vec<String> {
        [TAXID_COL, SSEQID_COL, KO_COL, EVALUE_COL, PIDENT_COL]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn with_hits(header: Vec<String>, hits: Vec<Hit>) -> Self {
        Self { header, hits }
    }

    /// Render the table as TSV, header first.
    pub fn to_tsv(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for hit in &self.hits {
            writer.write_record(&hit.fields)?;
        }
        writer
            .into_inner()
            .map_err(|e| KocovError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

/// Read a tab-separated hit table from disk.
pub fn read_hit_table<P: AsRef<Path>>(path: P) -> Result<HitTable> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    parse_hit_table(file, path)
}

/// Parse a tab-separated hit table. `origin` names the source in errors.
pub fn parse_hit_table<R: Read>(input: R, origin: &Path) -> Result<HitTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(input);

    let header_rec = reader.headers()?.clone();
    let cols = Columns::locate(&header_rec, origin)?;
    let header: Vec<String> = header_rec.iter().map(str::to_string).collect();

    let mut hits = Vec::new();
    for rec in reader.records() {
        let rec = rec?;
        let line = rec.position().map(|p| p.line()).unwrap_or(0);
        hits.push(hit_from_record(&rec, &cols, line)?);
    }

    log::info!("Read {} hit(s) from {}", hits.len(), origin.display());
    Ok(HitTable { header, hits })
}

fn hit_from_record(rec: &StringRecord, cols: &Columns, line: u64) -> Result<Hit> {
    let field = |idx: usize| rec.get(idx).unwrap_or("").trim();

    let taxon_id: u32 = field(cols.taxid)
        .parse()
        .map_err(|_| parse_err(line, TAXID_COL, field(cols.taxid)))?;
    let e_value: f64 = field(cols.evalue)
        .parse()
        .map_err(|_| parse_err(line, EVALUE_COL, field(cols.evalue)))?;
    let percent_identity: f64 = field(cols.pident)
        .parse()
        .map_err(|_| parse_err(line, PIDENT_COL, field(cols.pident)))?;

    if e_value.is_nan() || e_value < 0.0 {
        return Err(parse_err(line, EVALUE_COL, field(cols.evalue)));
    }
    if percent_identity.is_nan() {
        return Err(parse_err(line, PIDENT_COL, field(cols.pident)));
    }

    Ok(Hit {
        taxon_id,
        subject_id: field(cols.sseqid).to_string(),
        ortholog_id: field(cols.ko).to_string(),
        e_value,
        percent_identity,
        fields: rec.iter().map(str::to_string).collect(),
    })
}

fn parse_err(line: u64, column: &str, value: &str) -> KocovError {
    KocovError::Parse(format!("line {line}: invalid {column} value '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "qseqid\ttaxid\tsseqid\tko\tevalue\tpident\tbitscore\n\
                         q1\t1\tg1\tK00001\t1e-10\t99\t310.2\n\
                         q2\t1\tg1\tK00002\t1e-5\t100\t120.0\n";

    #[test]
    fn reads_required_and_extra_columns() {
        let table = parse_hit_table(TABLE.as_bytes(), Path::new("mem")).unwrap();
        assert_eq!(table.header.len(), 7);
        assert_eq!(table.hits.len(), 2);
        let h = &table.hits[0];
        assert_eq!(h.taxon_id, 1);
        assert_eq!(h.subject_id, "g1");
        assert_eq!(h.ortholog_id, "K00001");
        assert_eq!(h.e_value, 1e-10);
        assert_eq!(h.percent_identity, 99.0);
        assert_eq!(h.fields[6], "310.2");
    }

    #[test]
    fn rows_are_written_back_verbatim() {
        let table = parse_hit_table(TABLE.as_bytes(), Path::new("mem")).unwrap();
        let out = String::from_utf8(table.to_tsv().unwrap()).unwrap();
        assert_eq!(out, TABLE);
    }

    #[test]
    fn missing_column_is_reported() {
        let err = parse_hit_table("taxid\tsseqid\tko\tevalue\n".as_bytes(), Path::new("x.tsv"))
            .unwrap_err();
        match err {
            KocovError::MissingColumn { column, .. } => assert_eq!(column, "pident"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let bad = "taxid\tsseqid\tko\tevalue\tpident\n1\tg1\tK1\tlow\t90\n";
        assert!(matches!(
            parse_hit_table(bad.as_bytes(), Path::new("mem")),
            Err(KocovError::Parse(_))
        ));
        let negative = "taxid\tsseqid\tko\tevalue\tpident\n1\tg1\tK1\t-1\t90\n";
        assert!(parse_hit_table(negative.as_bytes(), Path::new("mem")).is_err());
    }

    #[test]
    fn canonical_header_matches_hit_new_fields() {
        let table = HitTable::with_hits(
            HitTable::canonical_header(),
            vec![Hit::new(3, "s", "K2", 0.5, 70.0)],
        );
        let out = String::from_utf8(table.to_tsv().unwrap()).unwrap();
        assert_eq!(out, "taxid\tsseqid\tko\tevalue\tpident\n3\ts\tK2\t0.5\t70\n");
    }
}
