// src/ko_info.rs

use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Result;

/// The fields kept from one KEGG orthology flat file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KoInfo {
    pub entry: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

/// Pull `ENTRY`, `SYMBOL` and `NAME` out of a KEGG flat file.
///
/// `ENTRY` keeps only its first token (`ENTRY K00360 KO` gives `K00360`).
/// A keyword seen twice keeps the later line.
pub fn parse_ko_record<R: BufRead>(reader: R) -> Result<KoInfo> {
    let mut info = KoInfo::default();
    for line in reader.lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix("ENTRY") {
            info.entry = rest.split_whitespace().next().map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("SYMBOL") {
            info.symbol = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("NAME") {
            info.name = Some(rest.trim().to_string());
        }
    }
    Ok(info)
}

/// Read one KO id per line.
pub fn read_ko_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut kos = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let ko = line.trim();
        if !ko.is_empty() {
            kos.push(ko.to_string());
        }
    }
    Ok(kos)
}

/// Render records as an `ENTRY, SYMBOL, NAME` TSV; missing fields are empty.
pub fn ko_info_tsv(records: &[KoInfo]) -> String {
    let mut output = String::from("ENTRY\tSYMBOL\tNAME\n");
    for rec in records {
        let _ = writeln!(
            output,
            "{}\t{}\t{}",
            rec.entry.as_deref().unwrap_or(""),
            rec.symbol.as_deref().unwrap_or(""),
            rec.name.as_deref().unwrap_or("")
        );
    }
    output
}

/// Collect `{datdir}/{KO}.txt` for every KO listed in `kos_path` into one table.
pub fn build_ko_info_file<P: AsRef<Path>, Q: AsRef<Path>, O: AsRef<Path>>(
    kos_path: P,
    datdir: Q,
    out_path: O,
) -> Result<usize> {
    let kos = read_ko_list(kos_path)?;
    log::info!("Collecting info for {} KO(s)", kos.len());

    let mut records = Vec::with_capacity(kos.len());
    for ko in &kos {
        let path = datdir.as_ref().join(format!("{ko}.txt"));
        log::debug!("Parsing {}", path.display());
        records.push(parse_ko_record(BufReader::new(File::open(&path)?))?);
    }

    fs::write(out_path, ko_info_tsv(&records))?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const K00360: &str = "ENTRY       K00360                      KO\n\
                          SYMBOL      nasB\n\
                          NAME        assimilatory nitrate reductase electron transfer subunit [EC:1.7.99.-]\n\
                          PATHWAY     map00910  Nitrogen metabolism\n\
                          ///\n";

    #[test]
    fn parses_flat_file_fields() {
        let info = parse_ko_record(K00360.as_bytes()).unwrap();
        assert_eq!(info.entry.as_deref(), Some("K00360"));
        assert_eq!(info.symbol.as_deref(), Some("nasB"));
        assert_eq!(
            info.name.as_deref(),
            Some("assimilatory nitrate reductase electron transfer subunit [EC:1.7.99.-]")
        );
    }

    #[test]
    fn builds_table_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("K00360.txt"), K00360).unwrap();
        fs::write(dir.path().join("K99999.txt"), "ENTRY K99999 KO\n").unwrap();
        let list = dir.path().join("kos.txt");
        fs::write(&list, "K00360\n\nK99999\n").unwrap();
        let out = dir.path().join("ko_info.tsv");

        assert_eq!(build_ko_info_file(&list, dir.path(), &out).unwrap(), 2);
        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ENTRY\tSYMBOL\tNAME");
        assert!(lines[1].starts_with("K00360\tnasB\tassimilatory"));
        assert_eq!(lines[2], "K99999\t\t");
    }

    #[test]
    fn missing_flat_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("kos.txt");
        fs::write(&list, "K00001\n").unwrap();
        assert!(build_ko_info_file(&list, dir.path(), dir.path().join("o.tsv")).is_err());
    }
}
