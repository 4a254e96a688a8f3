// src/annotation.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use ahash::AHashMap;
use flate2::read::MultiGzDecoder;

use crate::error::{KocovError, Result};

/// Feature type eligible for region lookup.
pub const CDS_FEATURE: &str = "CDS";

/// Attribute compared against resolved subject ids.
pub const NAME_ATTRIBUTE: &str = "Name";

const ANNOTATION_COLUMNS: usize = 9;
const FASTA_DIRECTIVE: &str = "##FASTA";

/// One 9-column annotation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationFeature {
    /// 1-based line number in the source, for error messages.
    pub line: usize,
    pub seqid: String,
    pub feature_type: String,
    pub start: u64,
    pub stop: u64,
    /// Raw `key=value;key=value` string from column 9.
    pub attributes: String,
}

impl AnnotationFeature {
    pub fn is_cds(&self) -> bool {
        self.feature_type == CDS_FEATURE
    }

    /// Parsed attribute list. A repeated key keeps its last value.
    pub fn attribute_map(&self) -> Result<AHashMap<&str, &str>> {
        parse_attributes(&self.attributes, self.line)
    }
}

/// Split a `key=value;key=value` attribute string.
///
/// Empty segments (a trailing `;`) are ignored. Any other segment that does
/// not split into exactly one key and one value is an error.
pub fn parse_attributes(raw: &str, line: usize) -> Result<AHashMap<&str, &str>> {
    let mut map = AHashMap::new();
    for item in raw.split(';') {
        if item.is_empty() {
            continue;
        }
        let mut parts = item.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => {
                map.insert(key, value);
            }
            _ => {
                return Err(KocovError::MalformedAnnotation {
                    line,
                    message: format!("attribute '{item}' is not a key=value pair"),
                })
            }
        }
    }
    Ok(map)
}

/// Open an annotation file, transparently decompressing `.gz`.
pub fn open_annotation<P: AsRef<Path>>(path: P) -> Result<AnnotationReader<Box<dyn BufRead>>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(AnnotationReader::new(reader))
}

/// Streams feature records one line at a time.
///
/// Comment lines and blank lines are skipped, and a `##FASTA` directive ends
/// the stream.
pub struct AnnotationReader<R: BufRead> {
    reader: R,
    line: String,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            done: false,
        }
    }

    fn next_feature(&mut self) -> Result<Option<AnnotationFeature>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let row = self.line.trim_end_matches(['\n', '\r']);
            if row.starts_with(FASTA_DIRECTIVE) {
                return Ok(None);
            }
            if row.is_empty() || row.starts_with('#') {
                continue;
            }
            return parse_feature(row, self.line_no).map(Some);
        }
    }
}

impl<R: BufRead> Iterator for AnnotationReader<R> {
    type Item = Result<AnnotationFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_feature() {
            Ok(Some(feature)) => Some(Ok(feature)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_feature(row: &str, line: usize) -> Result<AnnotationFeature> {
    let cols: Vec<&str> = row.split('\t').collect();
    if cols.len() < ANNOTATION_COLUMNS {
        return Err(KocovError::MalformedAnnotation {
            line,
            message: format!("expected {ANNOTATION_COLUMNS} columns, found {}", cols.len()),
        });
    }

    let coord = |idx: usize| {
        cols[idx].trim().parse::<u64>().map_err(|_| KocovError::MalformedAnnotation {
            line,
            message: format!("invalid coordinate '{}'", cols[idx]),
        })
    };

    Ok(AnnotationFeature {
        line,
        seqid: cols[0].to_string(),
        feature_type: cols[2].to_string(),
        start: coord(3)?,
        stop: coord(4)?,
        attributes: cols[8].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use flate2::write::GzEncoder;
    use flate2::Compression;

    const GFF: &str = "##gff-version 3\n\
        #!processor NCBI annotwriter\n\
        chr1\tRefSeq\tregion\t1\t5000\t.\t+\t.\tID=chr1:1..5000\n\
        chr1\tRefSeq\tCDS\t100\t200\t.\t+\t0\tID=cds1;Name=g1\n\
        \n\
        chr1\tRefSeq\tgene\t300\t420\t.\t-\t.\tID=gene2\n\
        ##FASTA\n\
        >chr1\n\
        ACGT\n";

    #[test]
    fn skips_comments_and_stops_at_fasta() {
        let features: Vec<_> = AnnotationReader::new(Cursor::new(GFF))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(features.len(), 3);
        let cds = &features[1];
        assert!(cds.is_cds());
        assert_eq!((cds.start, cds.stop), (100, 200));
        assert_eq!(cds.attributes, "ID=cds1;Name=g1");
        assert_eq!(cds.line, 4);
    }

    #[test]
    fn attribute_pairs_are_split() {
        let map = parse_attributes("ID=cds1;Name=g1;product=kinase", 1).unwrap();
        assert_eq!(map.get(NAME_ATTRIBUTE), Some(&"g1"));
        assert_eq!(map.len(), 3);
        assert_eq!(parse_attributes("ID=a;", 1).unwrap().len(), 1);
    }

    #[test]
    fn malformed_attribute_pairs_are_errors() {
        for raw in ["ID=a;flag", "Note=a=b", "ID=a;;=x=y"] {
            assert!(
                matches!(
                    parse_attributes(raw, 12),
                    Err(KocovError::MalformedAnnotation { line: 12, .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn short_rows_are_errors() {
        let mut reader = AnnotationReader::new(Cursor::new("chr1\tRefSeq\tCDS\t1\t2\n"));
        assert!(matches!(
            reader.next(),
            Some(Err(KocovError::MalformedAnnotation { line: 1, .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn reads_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genomic.gff.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(GFF.as_bytes()).unwrap();
        enc.finish().unwrap();

        let n = open_annotation(&path).unwrap().filter(|f| f.is_ok()).count();
        assert_eq!(n, 3);
    }
}
