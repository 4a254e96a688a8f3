// src/lib.rs
pub mod types;
pub mod error;
pub mod config;
pub mod hits;
pub mod top_hit;
pub mod best_match;
pub mod annotation;
pub mod regions;
pub mod taxdb;
pub mod coverage;
pub mod aggregate;
pub mod ko_info;

use std::fs;
use std::path::{Path, PathBuf};
use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::aggregate::CoverageAggregator;
use crate::annotation::open_annotation;
use crate::best_match::filter_best_matches;
use crate::config::PipelineConfig;
use crate::coverage::{CoverageSource, NpzCoverage};
use crate::hits::{read_hit_table, HitTable};
use crate::regions::{locate_regions, read_region_tables, region_table_name, RegionsByTaxon};
use crate::taxdb::parse_taxon_tables;

pub use crate::error::{KocovError, Result};
pub use crate::ko_info::build_ko_info_file;

const NPZ_EXTENSION: &str = ".npz";

/// Resolve one ortholog per `(taxid, sseqid)` and write the selected rows,
/// with all of the input's columns, to `out_path`.
pub fn filter_best_matches_file<P: AsRef<Path>, Q: AsRef<Path>>(
    hits_path: P,
    out_path: Q,
) -> Result<usize> {
    let table = read_hit_table(hits_path)?;
    let resolved = filter_best_matches(&table.hits)?;
    log::info!(
        "Resolved {} hit(s) to {} subject assignment(s)",
        table.hits.len(),
        resolved.len()
    );

    let n = resolved.len();
    let out = HitTable::with_hits(table.header, resolved).to_tsv()?;
    fs::write(out_path, out)?;
    Ok(n)
}

/// Locate the regions of `taxon_id` in its annotation file and write
/// `identified_regions_{taxon_id}.tsv` into `outdir`.
pub fn locate_regions_file<P: AsRef<Path>, Q: AsRef<Path>, O: AsRef<Path>>(
    taxon_id: u32,
    annotation_path: P,
    resolved_path: Q,
    outdir: O,
) -> Result<PathBuf> {
    let resolved = read_hit_table(resolved_path)?;
    let annotations = open_annotation(annotation_path)?;
    let table = locate_regions(taxon_id, annotations, &resolved.hits)?;

    fs::create_dir_all(&outdir)?;
    let out_path = outdir.as_ref().join(region_table_name(taxon_id));
    fs::write(&out_path, table.to_tsv())?;
    Ok(out_path)
}

/// Inputs of the coverage stage.
#[derive(Debug, Clone)]
pub struct CoverageOptions {
    /// Directory holding `identified_regions_{taxid}.tsv` tables.
    pub regions_dir: PathBuf,
    /// One `.npz` per sample.
    pub coverage_dir: PathBuf,
    /// Same-named `.npz` files for taxa read from the secondary collection.
    pub secondary_coverage_dir: Option<PathBuf>,
    pub accessions_path: PathBuf,
    pub scaffolds_path: PathBuf,
    pub outdir: PathBuf,
    pub config: PipelineConfig,
    /// Samples processed at once.
    pub threads: usize,
}

/// One sample's coverage archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub file_name: String,
    pub path: PathBuf,
}

/// The `.npz` archives in `dir`, sorted by file name. The sample name is the
/// file stem without `prefix`.
pub fn coverage_samples<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Vec<Sample>> {
    let mut samples: Vec<Sample> = fs::read_dir(dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let file_name = path.file_name()?.to_str()?.to_string();
            let stem = file_name.strip_suffix(NPZ_EXTENSION)?;
            let name = stem.strip_prefix(prefix).unwrap_or(stem).to_string();
            Some(Sample {
                name,
                file_name,
                path,
            })
        })
        .collect();
    samples.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(samples)
}

/// Compute per-region depth for every sample and write one
/// `{output_prefix}{sample}.csv` per sample. Returns the written paths in
/// sample order.
pub fn compute_region_coverage(
    opts: &CoverageOptions,
    progress: Option<&ProgressBar>,
) -> Result<Vec<PathBuf>> {
    let samples = coverage_samples(&opts.coverage_dir, &opts.config.sample_prefix)?;
    let taxa = parse_taxon_tables(&opts.accessions_path, &opts.scaffolds_path)?;
    let regions = read_region_tables(&opts.regions_dir)?;
    log::info!(
        "{} sample(s), {} taxa with regions",
        samples.len(),
        regions.len()
    );
    if opts.secondary_coverage_dir.is_none() && opts.config.needs_secondary() {
        log::warn!("No secondary coverage directory given; taxa that need it will get -1 depths");
    }

    fs::create_dir_all(&opts.outdir)?;
    if let Some(pb) = progress {
        pb.set_length(samples.len() as u64);
    }

    let aggregator = CoverageAggregator::new(&opts.config, &taxa);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads.max(1))
        .build()?;

    pool.install(|| {
        samples
            .par_iter()
            .map(|sample| {
                let out = process_sample(sample, opts, &regions, &aggregator);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                out
            })
            .collect()
    })
}

/// Aggregate and write one sample. Its arrays are released on return.
pub fn process_sample(
    sample: &Sample,
    opts: &CoverageOptions,
    regions: &RegionsByTaxon,
    aggregator: &CoverageAggregator,
) -> Result<PathBuf> {
    let mut primary = NpzCoverage::open(&sample.path)?;
    let mut secondary = match &opts.secondary_coverage_dir {
        Some(dir) => {
            let path = dir.join(&sample.file_name);
            if path.exists() {
                Some(NpzCoverage::open(&path)?)
            } else {
                log::warn!("[{}] no secondary coverage file {}", sample.name, path.display());
                None
            }
        }
        None => None,
    };

    let coverage = aggregator.aggregate(
        &sample.name,
        regions,
        &mut primary,
        secondary.as_mut().map(|s| s as &mut dyn CoverageSource),
    )?;

    let out_path = opts
        .outdir
        .join(format!("{}{}.csv", opts.config.output_prefix, sample.name));
    fs::write(&out_path, coverage.to_csv()?)?;
    log::debug!("[{}] wrote {}", sample.name, out_path.display());
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::NpzWriter;
    use std::fs::File;

    const HITS: &str = "taxid\tsseqid\tko\tevalue\tpident\n\
                        1\tg1\tK1\t1e-10\t99\n\
                        1\tg1\tK2\t1e-5\t100\n\
                        1\tg2\tK3\t1e-7\t80\n\
                        2\th1\tK1\t1e-9\t70\n";

    const GFF: &str = "##gff-version 3\n\
                       scafA\tRefSeq\tgene\t2\t5\t.\t+\t.\tID=gene-g1;Name=g1\n\
                       scafA\tRefSeq\tCDS\t2\t5\t.\t+\t0\tID=cds-g1;Name=g1\n\
                       scafA\tRefSeq\tCDS\t0\t3\t.\t+\t0\tID=cds-g2;Name=g2\n\
                       scafA\tRefSeq\tCDS\t4\t6\t.\t-\t0\tID=cds-g9;Name=g9\n";

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        // 1. best matches
        fs::write(root.join("hits.tsv"), HITS).unwrap();
        let n = filter_best_matches_file(root.join("hits.tsv"), root.join("best.tsv")).unwrap();
        assert_eq!(n, 3);
        let best = fs::read_to_string(root.join("best.tsv")).unwrap();
        assert!(best.contains("1\tg1\tK1\t1e-10\t99\n"));
        assert!(!best.contains("K2"));

        // 2. regions for taxon 1
        fs::write(root.join("genomic.gff"), GFF).unwrap();
        let regions_dir = root.join("regions");
        let table_path =
            locate_regions_file(1, root.join("genomic.gff"), root.join("best.tsv"), &regions_dir)
                .unwrap();
        assert_eq!(table_path, regions_dir.join("identified_regions_1.tsv"));
        assert_eq!(
            fs::read_to_string(&table_path).unwrap(),
            "ko\tname\tstart\tstop\tdesc\n\
             K3\tg2\t0\t3\tID=cds-g2;Name=g2\n\
             K1\tg1\t2\t5\tID=cds-g1;Name=g1\n"
        );
        locate_regions_file(2, root.join("genomic.gff"), root.join("best.tsv"), &regions_dir)
            .unwrap();

        // 3. coverage for two samples; taxon 2 has no scaffold
        let cov_dir = root.join("cov");
        fs::create_dir_all(&cov_dir).unwrap();
        for (sample, scale) in [("s1", 1i64), ("s2", 2i64)] {
            let mut npz =
                NpzWriter::new(File::create(cov_dir.join(format!("coverage_arrays_{sample}.npz"))).unwrap());
            npz.add_array("scafA", &(array![0i64, 0, 10, 10, 10, 0] * scale)).unwrap();
            npz.finish().unwrap();
        }
        fs::write(root.join("acc.csv"), "taxid,accession_number\n1,GCF_1\n2,GCF_2\n").unwrap();
        fs::write(root.join("scaf.csv"), "taxid,species\n1,scafA\n2,\n").unwrap();

        let opts = CoverageOptions {
            regions_dir,
            coverage_dir: cov_dir,
            secondary_coverage_dir: None,
            accessions_path: root.join("acc.csv"),
            scaffolds_path: root.join("scaf.csv"),
            outdir: root.join("out"),
            config: PipelineConfig::default(),
            threads: 2,
        };
        let written = compute_region_coverage(&opts, None).unwrap();
        assert_eq!(
            written,
            vec![root.join("out/coverage_s1.csv"), root.join("out/coverage_s2.csv")]
        );

        let s2 = fs::read_to_string(&written[1]).unwrap();
        assert_eq!(
            s2,
            "taxid,ko,name,start,stop,seq_length,avg_depth,max_depth,desc\n\
             1,K3,g2,0,3,3,6.666666666666667,20.0,ID=cds-g2;Name=g2\n\
             1,K1,g1,2,5,3,20.0,20.0,ID=cds-g1;Name=g1\n"
        );
    }

    #[test]
    fn split_taxon_reads_the_secondary_collection_per_sample() {
        use crate::config::PARABACTEROIDES_MSK_9_14;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let regions_dir = root.join("regions");
        fs::create_dir_all(&regions_dir).unwrap();
        fs::write(
            regions_dir.join(region_table_name(PARABACTEROIDES_MSK_9_14)),
            "ko\tname\tstart\tstop\tdesc\n\
             K1\tcds:contig_1\t1\t3\tID=a\n",
        )
        .unwrap();
        fs::write(root.join("acc.csv"), "taxid,accession_number\n").unwrap();
        fs::write(root.join("scaf.csv"), "taxid,species\n").unwrap();

        // s1 has a secondary archive, s2 does not
        let cov_dir = root.join("cov");
        let para_dir = root.join("para");
        fs::create_dir_all(&cov_dir).unwrap();
        fs::create_dir_all(&para_dir).unwrap();
        for sample in ["s1", "s2"] {
            let mut npz = NpzWriter::new(File::create(cov_dir.join(format!("cov_{sample}.npz"))).unwrap());
            npz.add_array("scafA", &array![1i64, 1, 1]).unwrap();
            npz.finish().unwrap();
        }
        let mut npz = NpzWriter::new(File::create(para_dir.join("cov_s1.npz")).unwrap());
        npz.add_array("contig_1_Parabacteroides_sp._MSK.9.14", &array![5u32, 1, 3])
            .unwrap();
        npz.finish().unwrap();

        let config = PipelineConfig {
            sample_prefix: "cov_".to_string(),
            output_prefix: "depth_".to_string(),
            ..PipelineConfig::default()
        };
        let opts = CoverageOptions {
            regions_dir,
            coverage_dir: cov_dir,
            secondary_coverage_dir: Some(para_dir),
            accessions_path: root.join("acc.csv"),
            scaffolds_path: root.join("scaf.csv"),
            outdir: root.join("out"),
            config,
            threads: 1,
        };
        let written = compute_region_coverage(&opts, None).unwrap();
        assert_eq!(
            written,
            vec![root.join("out/depth_s1.csv"), root.join("out/depth_s2.csv")]
        );

        let header = "taxid,ko,name,start,stop,seq_length,avg_depth,max_depth,desc\n";
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            format!("{header}2849180,K1,cds:contig_1,1,3,2,2.0,3.0,ID=a\n")
        );
        assert_eq!(
            fs::read_to_string(&written[1]).unwrap(),
            format!("{header}2849180,K1,cds:contig_1,1,3,2,-1.0,-1.0,ID=a\n")
        );
    }

    #[test]
    fn samples_are_found_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["coverage_arrays_b.npz", "coverage_arrays_a.npz", "other.npz", "notes.txt"] {
            fs::write(dir.path().join(f), b"").unwrap();
        }
        let samples = coverage_samples(dir.path(), "coverage_arrays_").unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "other"]);
    }
}
