//! The profile record: the structured, self-describing representation of an
//! entire perf.data file.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::attr::{PerfFileAttr, SampleFormat};
use crate::buildid::{bytes_to_hex, hex_to_bytes, perfize_hex};
use crate::codec::aligned_string_len;
use crate::consts::*;
use crate::error::Result;
use crate::record::{EventData, EventRecord};
use crate::sample_info::SampleInfoRegistry;

/// An event name with the config value that identifies its attribute.
/// Populated from the obsolete event-type section or from EVENT_DESC
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerfEventType {
    pub id: u64,
    pub name: String,
}

/// One build-id record: which file on the profiled system had which build id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildIdRecord {
    pub misc: u16,
    pub pid: i32,
    /// The raw hash, trailing zeros trimmed.
    pub build_id: Vec<u8>,
    /// The length recorded by newer producers (`misc & BUILD_ID_SIZE`).
    pub size: Option<u8>,
    pub filename: String,
    /// Set when the record was injected rather than read from the input.
    pub is_injected: bool,
}

impl BuildIdRecord {
    pub fn build_id_hex(&self) -> String {
        bytes_to_hex(&self.build_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StringMetadata {
    pub hostname: Option<String>,
    pub kernel_version: Option<String>,
    pub perf_version: Option<String>,
    pub architecture: Option<String>,
    pub cpu_description: Option<String>,
    pub cpu_id: Option<String>,
    pub perf_command_line_tokens: Vec<String>,
    pub perf_command_line_whole: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerfUint32Metadata {
    pub type_: u32,
    pub data: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerfUint64Metadata {
    pub type_: u32,
    pub data: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerfCpu {
    pub core_id: u32,
    pub socket_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CpuTopologyMetadata {
    pub core_siblings: Vec<String>,
    pub thread_siblings: Vec<String>,
    /// Core and socket ids per online CPU; recorded by newer perf versions.
    pub available_cpus: Vec<PerfCpu>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NumaTopologyNode {
    pub id: u32,
    pub total_memory: u64,
    pub free_memory: u64,
    pub cpu_list: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PmuMapping {
    pub type_: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupDesc {
    pub name: String,
    pub leader_idx: u32,
    pub num_members: u32,
}

/// Counters filled in by the parser pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ParserStats {
    pub num_sample_events: u64,
    pub num_mmap_events: u64,
    pub num_fork_events: u64,
    pub num_exit_events: u64,
    pub num_sample_events_mapped: u64,
    pub num_data_sample_events: u64,
    pub num_data_sample_events_mapped: u64,
    pub did_remap: bool,
}

/// Everything read from one perf.data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerfData {
    pub file_attrs: Vec<PerfFileAttr>,
    pub event_types: Vec<PerfEventType>,
    pub events: Vec<EventRecord>,
    pub build_ids: Vec<BuildIdRecord>,
    pub string_metadata: StringMetadata,
    pub uint32_metadata: Vec<PerfUint32Metadata>,
    pub uint64_metadata: Vec<PerfUint64Metadata>,
    pub cpu_topology: Option<CpuTopologyMetadata>,
    pub numa_topology: Vec<NumaTopologyNode>,
    pub pmu_mappings: Vec<PmuMapping>,
    pub group_desc: Vec<GroupDesc>,
    pub tracing_data: Vec<u8>,
    /// Bitset of metadata kinds present, indexed by `HEADER_*` feature ids.
    pub metadata_mask: u64,
    pub stats: ParserStats,
    /// Seconds since the epoch at which the record was produced.
    pub timestamp_sec: Option<u64>,
}

impl PerfData {
    pub fn metadata_bit(&self, feature: u32) -> bool {
        self.metadata_mask & (1 << feature) != 0
    }

    pub fn set_metadata_bit(&mut self, feature: u32) {
        self.metadata_mask |= 1 << feature;
    }

    /// Builds the sample-info reader registry for this profile's attributes.
    pub fn build_registry(&self) -> Result<SampleInfoRegistry> {
        let mut registry = SampleInfoRegistry::new();
        for attr in &self.file_attrs {
            registry.add_attr(attr)?;
        }
        Ok(registry)
    }

    /// All distinct filenames that appear in MMAP/MMAP2 events, sorted.
    pub fn filenames(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .events
            .iter()
            .filter_map(|e| e.mmap_parts())
            .map(|(_, _, _, _, filename)| filename)
            .collect();
        set.into_iter().map(str::to_owned).collect()
    }

    /// Filename to "perfized" (40-hex-digit padded) build-id string, from
    /// the build-id records.
    pub fn filenames_to_build_ids(&self) -> BTreeMap<String, String> {
        self.build_ids
            .iter()
            .map(|b| {
                let mut hex = b.build_id_hex();
                perfize_hex(&mut hex);
                (b.filename.clone(), hex)
            })
            .collect()
    }

    /// Stable-sorts events by timestamp, but only when every attribute
    /// records `PERF_SAMPLE_TIME` (events are otherwise unordered in time).
    pub fn maybe_sort_events_by_time(&mut self) {
        let all_timed = self
            .file_attrs
            .iter()
            .all(|a| a.attr.sample_format.contains(SampleFormat::TIME));
        if !all_timed {
            return;
        }
        self.events
            .sort_by_key(|e| e.timestamp().unwrap_or(0));
    }

    /// Replaces or adds build-id records from a `filename -> hex build id`
    /// table. New records take their `misc` from an MMAP of the same
    /// filename, defaulting to a kernel record.
    pub fn inject_build_ids(
        &mut self,
        filenames_to_build_ids: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.set_metadata_bit(HEADER_BUILD_ID);
        let mut updated: BTreeSet<String> = BTreeSet::new();

        for record in &mut self.build_ids {
            let Some(hex) = filenames_to_build_ids.get(&record.filename) else {
                continue;
            };
            record.build_id = hex_to_bytes(hex)?;
            record.is_injected = true;
            updated.insert(record.filename.clone());
        }

        let mut filename_to_misc = BTreeMap::new();
        for event in &self.events {
            if let Some((_, _, _, _, filename)) = event.mmap_parts() {
                filename_to_misc.insert(filename.to_owned(), event.header.misc);
            }
        }

        for (filename, hex) in filenames_to_build_ids {
            if updated.contains(filename) {
                continue;
            }
            let misc = filename_to_misc
                .get(filename)
                .copied()
                .unwrap_or(PERF_RECORD_MISC_KERNEL);
            self.build_ids.push(BuildIdRecord {
                misc,
                pid: -1,
                build_id: hex_to_bytes(hex)?,
                size: None,
                filename: filename.clone(),
                is_injected: true,
            });
        }
        Ok(())
    }

    /// Renames files by build id: any file whose build id appears in the
    /// table is renamed to the table's filename, in MMAP events and build-id
    /// records both.
    pub fn localize(&mut self, build_ids_to_filenames: &BTreeMap<String, String>) -> Result<()> {
        let mut filename_map = BTreeMap::new();
        for record in &self.build_ids {
            let mut hex = record.build_id_hex();
            perfize_hex(&mut hex);
            if let Some(new_filename) = build_ids_to_filenames.get(&hex) {
                filename_map.insert(record.filename.clone(), new_filename.clone());
            }
        }
        self.localize_using_filenames(&filename_map)
    }

    /// Renames files per the given old-name to new-name table.
    pub fn localize_using_filenames(
        &mut self,
        filename_map: &BTreeMap<String, String>,
    ) -> Result<()> {
        for event in &mut self.events {
            let (filename, header) = match &mut event.data {
                EventData::Mmap(m) => (&mut m.filename, &mut event.header),
                EventData::Mmap2(m) => (&mut m.filename, &mut event.header),
                _ => continue,
            };
            let Some(new_filename) = filename_map.get(filename.as_str()) else {
                continue;
            };
            let old_len = aligned_string_len(filename);
            let new_len = aligned_string_len(new_filename);
            header.size = (header.size as usize - old_len + new_len) as u16;
            *filename = new_filename.clone();
        }

        for record in &mut self.build_ids {
            if let Some(new_filename) = filename_map.get(&record.filename) {
                record.filename = new_filename.clone();
            }
        }
        Ok(())
    }
}
