//! DSO bookkeeping for the parser: which binaries were mapped, what is
//! known about their identity, and best-effort build-id read-back across
//! mount namespaces.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::buildid::BuildIdSource;

/// What the parser knows about one mapped binary.
#[derive(Debug, Clone, Default)]
pub struct DsoInfo {
    pub name: String,
    pub build_id: Option<Vec<u8>>,
    /// Device and inode from an MMAP2 record, used to verify read-back
    /// candidates.
    pub maj: Option<u32>,
    pub min: Option<u32>,
    pub ino: Option<u64>,
    /// The first process observed mapping the binary; its /proc entries
    /// locate the binary inside the process's mount namespace.
    pub first_pid: Option<u32>,
    pub first_tid: Option<u32>,
    /// Whether any sample resolved into this binary.
    pub hit: bool,
}

/// Table of mapped binaries, keyed by filename.
#[derive(Debug, Default)]
pub struct DsoTable {
    dsos: BTreeMap<String, DsoInfo>,
}

impl DsoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, name: &str) -> &mut DsoInfo {
        self.dsos
            .entry(name.to_owned())
            .or_insert_with(|| DsoInfo {
                name: name.to_owned(),
                ..Default::default()
            })
    }

    pub fn get(&self, name: &str) -> Option<&DsoInfo> {
        self.dsos.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DsoInfo> {
        self.dsos.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DsoInfo> {
        self.dsos.values_mut()
    }
}

/// The paths at which a binary named by an MMAP may be found, in preference
/// order. The profiled process may have lived in a mount namespace, in
/// which case the path is only meaningful under the process's /proc root;
/// the host path comes last.
pub fn candidate_paths(dso: &DsoInfo) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    let relative = dso.name.trim_start_matches('/');
    if let Some(tid) = dso.first_tid {
        paths.push(PathBuf::from(format!("/proc/{tid}/root/{relative}")));
    }
    if let Some(pid) = dso.first_pid {
        if dso.first_tid != Some(pid) {
            paths.push(PathBuf::from(format!("/proc/{pid}/root/{relative}")));
        }
    }
    paths.push(PathBuf::from(&dso.name));
    paths
}

fn identity_matches(dso: &DsoInfo, source: &dyn BuildIdSource, path: &Path) -> bool {
    let (Some(maj), Some(min), Some(ino)) = (dso.maj, dso.min, dso.ino) else {
        // Without a recorded identity every candidate is acceptable.
        return true;
    };
    match source.file_identity(path) {
        Some(identity) => identity == (maj, min, ino),
        // An unstattable candidate cannot be verified; let the read decide.
        None => true,
    }
}

/// Best-effort read of a missing build id. Candidates with a known but
/// mismatching device/inode identity are rejected; the first remaining
/// candidate with a readable build id wins. Failures only cost a log line.
pub fn read_missing_build_id(dso: &DsoInfo, source: &dyn BuildIdSource) -> Option<Vec<u8>> {
    for path in candidate_paths(dso) {
        if !identity_matches(dso, source, &path) {
            log::debug!(
                "rejecting {} for {}: device/inode does not match the mmap record",
                path.display(),
                dso.name
            );
            continue;
        }
        if let Some(build_id) = source.read_build_id(&path) {
            return Some(build_id);
        }
    }
    log::debug!("no build id found for {}", dso.name);
    None
}
