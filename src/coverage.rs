// src/coverage.rs

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use ahash::AHashMap;
use ndarray::Array1;
use ndarray_npy::{NpzReader, ReadNpzError, ReadableElement};

use crate::error::{KocovError, Result};

const NPY_SUFFIX: &str = ".npy";

/// A keyed collection of per-base depth arrays for one sample.
pub trait CoverageSource {
    /// The array stored under `key`, or `None` when the collection has none.
    fn depths(&mut self, key: &str) -> Result<Option<&[f64]>>;
}

/// Depth arrays held in memory.
#[derive(Debug, Clone, Default)]
pub struct CoverageArrays {
    arrays: AHashMap<String, Vec<f64>>,
}

impl CoverageArrays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, depths: Vec<f64>) {
        self.arrays.insert(key.into(), depths);
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<f64>)> for CoverageArrays {
    fn from_iter<I: IntoIterator<Item = (K, Vec<f64>)>>(iter: I) -> Self {
        Self {
            arrays: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl CoverageSource for CoverageArrays {
    fn depths(&mut self, key: &str) -> Result<Option<&[f64]>> {
        Ok(self.arrays.get(key).map(Vec::as_slice))
    }
}

/// Depth arrays of one `.npz` archive, decoded on first use.
///
/// Arrays of any integer or float dtype are widened to `f64`. Everything
/// decoded so far is dropped together with the value.
pub struct NpzCoverage<R: Read + Seek = File> {
    path: PathBuf,
    npz: NpzReader<R>,
    /// Array key (without `.npy`) -> member name inside the archive.
    members: AHashMap<String, String>,
    cache: AHashMap<String, Vec<f64>>,
}

impl NpzCoverage<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(file, path)
    }
}

impl<R: Read + Seek> NpzCoverage<R> {
    pub fn from_reader(reader: R, path: &Path) -> Result<Self> {
        let mut npz = NpzReader::new(reader)?;
        let members: AHashMap<String, String> = npz
            .names()?
            .into_iter()
            .map(|name| {
                let key = name.strip_suffix(NPY_SUFFIX).unwrap_or(&name).to_string();
                (key, name)
            })
            .collect();
        log::debug!("{}: {} array(s)", path.display(), members.len());
        Ok(Self {
            path: path.to_path_buf(),
            npz,
            members,
            cache: AHashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }
}

impl<R: Read + Seek> CoverageSource for NpzCoverage<R> {
    fn depths(&mut self, key: &str) -> Result<Option<&[f64]>> {
        if !self.cache.contains_key(key) {
            let Some(member) = self.members.get(key) else {
                return Ok(None);
            };
            let depths = read_widened(&mut self.npz, member).map_err(|e| {
                KocovError::Parse(format!(
                    "{}: cannot read array '{}': {}",
                    self.path.display(),
                    key,
                    e
                ))
            })?;
            self.cache.insert(key.to_string(), depths);
        }
        Ok(self.cache.get(key).map(Vec::as_slice))
    }
}

trait Depth: ReadableElement + Copy {
    fn widen(self) -> f64;
}

macro_rules! impl_depth {
    ($($t:ty),*) => {
        $(impl Depth for $t {
            #[inline]
            fn widen(self) -> f64 {
                self as f64
            }
        })*
    };
}

impl_depth!(f64, f32, i64, i32, i16, i8, u64, u32, u16, u8);

fn read_as<T: Depth, R: Read + Seek>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> std::result::Result<Vec<f64>, ReadNpzError> {
    let arr: Array1<T> = npz.by_name(name)?;
    Ok(arr.iter().map(|&v| v.widen()).collect())
}

type ArrayReader<R> = fn(&mut NpzReader<R>, &str) -> std::result::Result<Vec<f64>, ReadNpzError>;

/// Read a 1-D array whatever its numeric dtype. The member is tried both as
/// listed and with `.npy` appended.
fn read_widened<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    member: &str,
) -> std::result::Result<Vec<f64>, ReadNpzError> {
    let readers: [ArrayReader<R>; 10] = [
        read_as::<i64, R>,
        read_as::<u32, R>,
        read_as::<i32, R>,
        read_as::<f64, R>,
        read_as::<f32, R>,
        read_as::<u64, R>,
        read_as::<u16, R>,
        read_as::<i16, R>,
        read_as::<u8, R>,
        read_as::<i8, R>,
    ];
    let mut candidates = vec![member.to_string()];
    if !member.ends_with(NPY_SUFFIX) {
        candidates.push(format!("{member}{NPY_SUFFIX}"));
    }

    let mut last_err = None;
    for name in &candidates {
        for read in &readers {
            match read(npz, name) {
                Ok(depths) => return Ok(depths),
                Err(e) => last_err = Some(e),
            }
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => Ok(Vec::new()),
    }
}

/// Mean and maximum depth over `[start, stop)`.
///
/// `None` when the span is empty (`start >= stop`) or runs past the end of
/// the array. A NaN depth anywhere in the span makes both values NaN.
pub fn depth_stats(depths: &[f64], start: u64, stop: u64) -> Option<(f64, f64)> {
    let start = usize::try_from(start).ok()?;
    let stop = usize::try_from(stop).ok()?;
    if start >= stop || stop > depths.len() {
        return None;
    }
    let window = &depths[start..stop];
    let sum: f64 = window.iter().sum();
    let max = window.iter().copied().fold(f64::NEG_INFINITY, |m, v| {
        if m.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            m.max(v)
        }
    });
    Some((sum / window.len() as f64, max))
}
