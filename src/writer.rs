//! Writing a [`PerfData`] profile record back out as a normal-mode
//! perf.data file.
//!
//! Regardless of how the input was read (normal or piped), the output is a
//! normal-mode file: header, per-attribute ID lists, attribute descriptors,
//! the event data section, and the metadata trailer. Offsets are computed in
//! one forward pass; the metadata descriptor table is patched once the blob
//! sizes are known.

use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::codec;
use crate::consts::*;
use crate::error::{Error, Result};
use crate::profile::PerfData;
use crate::record::EventData;
use crate::sample_info::SampleInfoRegistry;

type E = LittleEndian;

/// On-disk size of one attr-section entry: the attr plus the file section
/// pointing at its IDs.
const FILE_ATTR_SIZE: u64 = PERF_ATTR_SIZE_VER7 as u64 + PERF_FILE_SECTION_SIZE as u64;

/// Writes the profile record as a normal-mode perf.data file.
pub struct PerfWriter<'a> {
    profile: &'a PerfData,
    registry: SampleInfoRegistry,
}

impl<'a> PerfWriter<'a> {
    pub fn new(profile: &'a PerfData) -> Result<Self> {
        let registry = profile.build_registry()?;
        Ok(Self { profile, registry })
    }

    pub fn write_to_vec(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write_to(&mut file)
    }

    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let layout = self.compute_layout()?;
        self.write_header(writer, &layout)?;
        self.write_attrs(writer, &layout)?;
        self.write_data(writer, &layout)?;
        self.write_metadata(writer, &layout)?;
        Ok(())
    }

    /// Total output size, useful for preallocation.
    pub fn expected_size(&self) -> Result<u64> {
        let layout = self.compute_layout()?;
        Ok(layout.metadata_offset
            + layout.num_metadata as u64 * PERF_FILE_SECTION_SIZE as u64
            + self.metadata_blobs_size()?)
    }

    fn adds_features(&self) -> u64 {
        self.profile.metadata_mask & SUPPORTED_METADATA_MASK
    }

    fn compute_layout(&self) -> Result<Layout> {
        let ids_offset = PERF_FILE_HEADER_SIZE;
        let total_ids: u64 = self
            .profile
            .file_attrs
            .iter()
            .map(|a| a.ids.len() as u64)
            .sum();
        let attrs_offset = ids_offset + total_ids * 8;
        let attrs_size = self.profile.file_attrs.len() as u64 * FILE_ATTR_SIZE;
        let data_offset = attrs_offset + attrs_size;

        let mut data_size = 0u64;
        for event in &self.profile.events {
            data_size += codec::event_size(event, &self.registry)? as u64;
            if let EventData::Auxtrace(auxtrace) = &event.data {
                data_size += auxtrace.trace_data.len() as u64;
            }
        }

        Ok(Layout {
            ids_offset,
            attrs_offset,
            attrs_size,
            data_offset,
            data_size,
            metadata_offset: data_offset + data_size,
            num_metadata: self.adds_features().count_ones() as usize,
        })
    }

    fn write_header<W: Write>(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        writer.write_u64::<E>(PERF_MAGIC)?;
        writer.write_u64::<E>(PERF_FILE_HEADER_SIZE)?;
        writer.write_u64::<E>(FILE_ATTR_SIZE)?;
        writer.write_u64::<E>(layout.attrs_offset)?;
        writer.write_u64::<E>(layout.attrs_size)?;
        writer.write_u64::<E>(layout.data_offset)?;
        writer.write_u64::<E>(layout.data_size)?;
        // The event-type section is obsolete; EVENT_DESC metadata carries
        // the names.
        writer.write_u64::<E>(layout.attrs_offset + layout.attrs_size)?;
        writer.write_u64::<E>(0)?;
        writer.write_u64::<E>(self.adds_features())?;
        writer.write_u64::<E>(0)?;
        writer.write_u64::<E>(0)?;
        writer.write_u64::<E>(0)?;
        Ok(())
    }

    fn write_attrs<W: Write>(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        // ID lists first, recording where each one lands.
        let mut id_sections = Vec::with_capacity(self.profile.file_attrs.len());
        let mut offset = layout.ids_offset;
        for attr in &self.profile.file_attrs {
            let size = attr.ids.len() as u64 * 8;
            id_sections.push((offset, size));
            for id in &attr.ids {
                writer.write_u64::<E>(*id)?;
            }
            offset += size;
        }

        for (attr, (ids_offset, ids_size)) in
            self.profile.file_attrs.iter().zip(id_sections)
        {
            attr.attr.write_to(writer)?;
            writer.write_u64::<E>(ids_offset)?;
            writer.write_u64::<E>(ids_size)?;
        }
        Ok(())
    }

    fn write_data<W: Write>(&self, writer: &mut W, _layout: &Layout) -> Result<()> {
        for event in &self.profile.events {
            codec::write_event(event, &self.registry, writer)?;
        }
        Ok(())
    }

    fn write_metadata<W: Write + Seek>(&self, writer: &mut W, layout: &Layout) -> Result<()> {
        let table_offset = layout.metadata_offset;
        let blobs_offset = table_offset + layout.num_metadata as u64 * 16;

        // Reserve the descriptor table and write the blobs.
        writer.write_all(&vec![0u8; layout.num_metadata * 16])?;
        let mut sections = Vec::with_capacity(layout.num_metadata);
        let mut position = blobs_offset;
        let features = self.adds_features();
        for feature in HEADER_FIRST_FEATURE..HEADER_LAST_FEATURE {
            if features & (1 << feature) == 0 {
                continue;
            }
            let mut blob = Vec::new();
            self.write_metadata_blob(feature, &mut blob)?;
            writer.write_all(&blob)?;
            sections.push((position, blob.len() as u64));
            position += blob.len() as u64;
        }

        // Patch the descriptor table now that the blob sizes are known.
        writer.seek(SeekFrom::Start(table_offset))?;
        for (offset, size) in &sections {
            writer.write_u64::<E>(*offset)?;
            writer.write_u64::<E>(*size)?;
        }
        writer.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    fn metadata_blobs_size(&self) -> Result<u64> {
        let mut total = 0u64;
        let features = self.adds_features();
        for feature in HEADER_FIRST_FEATURE..HEADER_LAST_FEATURE {
            if features & (1 << feature) == 0 {
                continue;
            }
            let mut blob = Vec::new();
            self.write_metadata_blob(feature, &mut blob)?;
            total += blob.len() as u64;
        }
        Ok(total)
    }

    fn write_metadata_blob(&self, feature: u32, writer: &mut Vec<u8>) -> Result<()> {
        match feature {
            HEADER_TRACING_DATA => writer.write_all(&self.profile.tracing_data)?,
            HEADER_BUILD_ID => self.write_build_id_metadata(writer)?,
            HEADER_HOSTNAME => {
                let s = &self.profile.string_metadata.hostname;
                write_string_with_size(s.as_deref().unwrap_or(""), writer)?
            }
            HEADER_OSRELEASE => {
                let s = &self.profile.string_metadata.kernel_version;
                write_string_with_size(s.as_deref().unwrap_or(""), writer)?
            }
            HEADER_VERSION => {
                let s = &self.profile.string_metadata.perf_version;
                write_string_with_size(s.as_deref().unwrap_or(""), writer)?
            }
            HEADER_ARCH => {
                let s = &self.profile.string_metadata.architecture;
                write_string_with_size(s.as_deref().unwrap_or(""), writer)?
            }
            HEADER_CPUDESC => {
                let s = &self.profile.string_metadata.cpu_description;
                write_string_with_size(s.as_deref().unwrap_or(""), writer)?
            }
            HEADER_CPUID => {
                let s = &self.profile.string_metadata.cpu_id;
                write_string_with_size(s.as_deref().unwrap_or(""), writer)?
            }
            HEADER_CMDLINE => {
                let tokens = &self.profile.string_metadata.perf_command_line_tokens;
                writer.write_u32::<E>(tokens.len() as u32)?;
                for token in tokens {
                    write_string_with_size(token, writer)?;
                }
            }
            HEADER_NRCPUS => self.write_uint32_metadata(HEADER_NRCPUS, writer)?,
            HEADER_TOTAL_MEM => self.write_uint64_metadata(HEADER_TOTAL_MEM, writer)?,
            HEADER_EVENT_DESC => self.write_event_desc_metadata(writer)?,
            HEADER_CPU_TOPOLOGY => self.write_cpu_topology_metadata(writer)?,
            HEADER_NUMA_TOPOLOGY => self.write_numa_topology_metadata(writer)?,
            HEADER_BRANCH_STACK => {}
            HEADER_PMU_MAPPINGS => self.write_pmu_mappings_metadata(writer)?,
            HEADER_GROUP_DESC => self.write_group_desc_metadata(writer)?,
            _ => {
                return Err(Error::format(format!(
                    "cannot write unsupported metadata {}",
                    metadata_name(feature)
                )))
            }
        }
        Ok(())
    }

    fn write_build_id_metadata(&self, writer: &mut Vec<u8>) -> Result<()> {
        for record in &self.profile.build_ids {
            if record.build_id.len() > BUILD_ID_SIZE {
                return Err(Error::BuildIdTooLong(record.build_id.len()));
            }
            let size = PERF_EVENT_HEADER_SIZE
                + 4
                + 24
                + codec::aligned_string_len(&record.filename);
            writer.write_u32::<E>(PERF_RECORD_HEADER_BUILD_ID)?;
            writer.write_u16::<E>(record.misc)?;
            writer.write_u16::<E>(size as u16)?;
            writer.write_i32::<E>(record.pid)?;
            let mut hash_storage = [0u8; 24];
            hash_storage[..record.build_id.len()].copy_from_slice(&record.build_id);
            if record.misc & PERF_RECORD_MISC_BUILD_ID_SIZE != 0 {
                hash_storage[20] = record.size.unwrap_or(record.build_id.len() as u8);
            }
            writer.write_all(&hash_storage)?;
            writer.write_all(record.filename.as_bytes())?;
            let padding = codec::aligned_string_len(&record.filename) - record.filename.len();
            writer.write_all(&vec![0u8; padding])?;
        }
        Ok(())
    }

    fn write_uint32_metadata(&self, type_: u32, writer: &mut Vec<u8>) -> Result<()> {
        let metadata = self
            .profile
            .uint32_metadata
            .iter()
            .find(|m| m.type_ == type_)
            .ok_or_else(|| {
                Error::format(format!(
                    "uint32 metadata of type {} not present",
                    metadata_name(type_)
                ))
            })?;
        for value in &metadata.data {
            writer.write_u32::<E>(*value)?;
        }
        Ok(())
    }

    fn write_uint64_metadata(&self, type_: u32, writer: &mut Vec<u8>) -> Result<()> {
        let metadata = self
            .profile
            .uint64_metadata
            .iter()
            .find(|m| m.type_ == type_)
            .ok_or_else(|| {
                Error::format(format!(
                    "uint64 metadata of type {} not present",
                    metadata_name(type_)
                ))
            })?;
        for value in &metadata.data {
            writer.write_u64::<E>(*value)?;
        }
        Ok(())
    }

    fn write_event_desc_metadata(&self, writer: &mut Vec<u8>) -> Result<()> {
        if self.profile.file_attrs.len() > self.profile.event_types.len() {
            return Err(Error::format(format!(
                "number of attrs ({}) cannot exceed number of event types ({})",
                self.profile.file_attrs.len(),
                self.profile.event_types.len()
            )));
        }
        writer.write_u32::<E>(self.profile.file_attrs.len() as u32)?;
        writer.write_u32::<E>(PERF_ATTR_SIZE_VER7)?;
        for (attr, event_type) in self
            .profile
            .file_attrs
            .iter()
            .zip(&self.profile.event_types)
        {
            attr.attr.write_to(writer)?;
            writer.write_u32::<E>(attr.ids.len() as u32)?;
            write_string_with_size(&event_type.name, writer)?;
            for id in &attr.ids {
                writer.write_u64::<E>(*id)?;
            }
        }
        Ok(())
    }

    fn write_cpu_topology_metadata(&self, writer: &mut Vec<u8>) -> Result<()> {
        let default = Default::default();
        let topology = self.profile.cpu_topology.as_ref().unwrap_or(&default);
        writer.write_u32::<E>(topology.core_siblings.len() as u32)?;
        for name in &topology.core_siblings {
            write_string_with_size(name, writer)?;
        }
        writer.write_u32::<E>(topology.thread_siblings.len() as u32)?;
        for name in &topology.thread_siblings {
            write_string_with_size(name, writer)?;
        }
        for cpu in &topology.available_cpus {
            writer.write_u32::<E>(cpu.core_id)?;
            writer.write_u32::<E>(cpu.socket_id)?;
        }
        Ok(())
    }

    fn write_numa_topology_metadata(&self, writer: &mut Vec<u8>) -> Result<()> {
        writer.write_u32::<E>(self.profile.numa_topology.len() as u32)?;
        for node in &self.profile.numa_topology {
            writer.write_u32::<E>(node.id)?;
            writer.write_u64::<E>(node.total_memory)?;
            writer.write_u64::<E>(node.free_memory)?;
            write_string_with_size(&node.cpu_list, writer)?;
        }
        Ok(())
    }

    fn write_pmu_mappings_metadata(&self, writer: &mut Vec<u8>) -> Result<()> {
        writer.write_u32::<E>(self.profile.pmu_mappings.len() as u32)?;
        for mapping in &self.profile.pmu_mappings {
            writer.write_u32::<E>(mapping.type_)?;
            write_string_with_size(&mapping.name, writer)?;
        }
        Ok(())
    }

    fn write_group_desc_metadata(&self, writer: &mut Vec<u8>) -> Result<()> {
        writer.write_u32::<E>(self.profile.group_desc.len() as u32)?;
        for group in &self.profile.group_desc {
            write_string_with_size(&group.name, writer)?;
            writer.write_u32::<E>(group.leader_idx)?;
            writer.write_u32::<E>(group.num_members)?;
        }
        Ok(())
    }
}

struct Layout {
    ids_offset: u64,
    attrs_offset: u64,
    attrs_size: u64,
    data_offset: u64,
    data_size: u64,
    metadata_offset: u64,
    num_metadata: usize,
}

/// The metadata string form: a u32 length covering the NUL-terminated,
/// u64-aligned storage, followed by that storage.
fn write_string_with_size(s: &str, writer: &mut Vec<u8>) -> Result<()> {
    let storage = codec::aligned_string_len(s);
    writer.write_u32::<E>(storage as u32)?;
    writer.write_all(s.as_bytes())?;
    writer.write_all(&vec![0u8; storage - s.len()])?;
    Ok(())
}
