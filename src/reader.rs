//! Reading perf.data bytes into a [`PerfData`] profile record.
//!
//! Files come in two flavors distinguished by the header size: "normal"
//! files carry an offset table and a metadata trailer; "piped" files are a
//! plain stream in which attributes, build ids and metadata arrive as
//! synthetic `PERF_RECORD_HEADER_*` events.

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::attr::{PerfEventAttr, PerfFileAttr};
use crate::buildid::detect_build_id_len;
use crate::codec::{
    self, fixed_payload_size, is_supported_header_type, is_supported_kernel_type,
    is_supported_user_type,
};
use crate::consts::*;
use crate::error::{Error, Result};
use crate::profile::{
    BuildIdRecord, CpuTopologyMetadata, GroupDesc, NumaTopologyNode, PerfCpu, PerfData,
    PerfEventType, PerfUint32Metadata, PerfUint64Metadata, PmuMapping,
};
use crate::record::{EventData, EventHeader, Mmap2FileId};
use crate::sample_info::SampleInfoRegistry;

/// Reads perf.data input into the structured profile record.
pub struct PerfReader {
    profile: PerfData,
    registry: SampleInfoRegistry,
    cross_endian: bool,
    attr_first_ids_seen: HashSet<u64>,
    attr_configs_seen: HashSet<u64>,
    filenames_with_inline_build_id: HashSet<String>,
    num_event_types_read: usize,
}

impl PerfReader {
    /// Reads a complete perf.data file from a byte slice.
    pub fn read_from_slice(data: &[u8]) -> Result<PerfData> {
        if data.is_empty() {
            return Err(Error::format("input data is empty"));
        }
        let mut reader = PerfReader {
            profile: PerfData::default(),
            registry: SampleInfoRegistry::new(),
            cross_endian: false,
            attr_first_ids_seen: HashSet::new(),
            attr_configs_seen: HashSet::new(),
            filenames_with_inline_build_id: HashSet::new(),
            num_event_types_read: 0,
        };
        reader.read(data)?;
        let mut profile = reader.profile;
        profile.timestamp_sec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs());
        Ok(profile)
    }

    /// Reads a perf.data file from disk.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<PerfData> {
        let data = std::fs::read(path)?;
        Self::read_from_slice(&data)
    }

    fn read(&mut self, data: &[u8]) -> Result<()> {
        let mut cur = Cursor::new(data);
        let magic = cur.read_u64::<LittleEndian>()?;
        if magic == PERF_MAGIC {
            self.cross_endian = false;
            self.read_with_order::<LittleEndian>(data, &mut cur)
        } else if magic.swap_bytes() == PERF_MAGIC {
            self.cross_endian = true;
            self.read_with_order::<BigEndian>(data, &mut cur)
        } else {
            Err(Error::UnrecognizedMagicValue(magic))
        }
    }

    fn read_with_order<T: ByteOrder>(
        &mut self,
        data: &[u8],
        cur: &mut Cursor<&[u8]>,
    ) -> Result<()> {
        let header_size = cur.read_u64::<T>()?;
        if header_size == PERF_PIPED_HEADER_SIZE {
            self.read_piped_data::<T>(data, cur)
        } else if header_size == PERF_FILE_HEADER_SIZE {
            self.read_file_data::<T>(data, cur)
        } else {
            Err(Error::UnrecognizedHeaderSize(header_size))
        }
    }

    // ---- normal mode ----

    fn read_file_data<T: ByteOrder>(
        &mut self,
        data: &[u8],
        cur: &mut Cursor<&[u8]>,
    ) -> Result<()> {
        let attr_size = cur.read_u64::<T>()?;
        let attr_section = read_file_section::<T>(cur, data.len())?;
        let data_section = read_file_section::<T>(cur, data.len())?;
        let event_types_section = read_file_section::<T>(cur, data.len())?;

        let mut features = [0u8; 32];
        cur.read_exact(&mut features)?;
        self.profile.metadata_mask = self.read_features_word::<T>(&features);

        if !self.profile.metadata_bit(HEADER_EVENT_DESC) {
            // EVENT_DESC metadata supersedes these sections when present.
            self.read_attrs_section::<T>(data, attr_size, attr_section)?;
            self.read_event_types_section::<T>(data, event_types_section)?;
        }

        self.read_metadata::<T>(data, data_section)?;
        self.read_data_section::<T>(data, data_section)?;

        // EVENT_DESC can be reconstructed from attrs and event types.
        if !self.profile.event_types.is_empty() {
            self.profile.set_metadata_bit(HEADER_EVENT_DESC);
        }
        Ok(())
    }

    /// The 256-bit feature bitmap is declared as an array of `unsigned
    /// long`, whose width depends on the producer. A cross-endian reader
    /// cannot know the width; following perf, try the u64-wise
    /// interpretation first and keep it if the HOSTNAME bit (always set by
    /// perf) comes out set, otherwise fall back to u32-wise.
    fn read_features_word<T: ByteOrder>(&self, features: &[u8; 32]) -> u64 {
        let as_u64 = T::read_u64(&features[0..8]);
        if !self.cross_endian || as_u64 & (1 << HEADER_HOSTNAME) != 0 {
            return as_u64;
        }
        let low = T::read_u32(&features[0..4]) as u64;
        let high = T::read_u32(&features[4..8]) as u64;
        low | high << 32
    }

    fn read_attrs_section<T: ByteOrder>(
        &mut self,
        data: &[u8],
        attr_size: u64,
        (offset, size): (u64, u64),
    ) -> Result<()> {
        if attr_size == 0 {
            return Err(Error::format("perf_file_header.attr_size is zero"));
        }
        if size % attr_size != 0 {
            log::warn!("attrs section size {size} is not a multiple of attr size {attr_size}");
        }
        let num_attrs = size / attr_size;
        let mut cur = Cursor::new(data);
        cur.set_position(offset);
        for _ in 0..num_attrs {
            let attr = PerfEventAttr::parse::<_, T>(&mut cur, None, self.cross_endian)?;
            let ids_section = read_file_section::<T>(&mut cur, data.len())?;
            let ids = read_ids::<T>(data, ids_section)?;
            self.add_attr(PerfFileAttr {
                attr,
                ids,
                name: None,
            })?;
        }
        Ok(())
    }

    fn read_event_types_section<T: ByteOrder>(
        &mut self,
        data: &[u8],
        (offset, size): (u64, u64),
    ) -> Result<()> {
        const EVENT_TYPE_ENTRY_SIZE: u64 = 8 + 64;
        let num_event_types = size / EVENT_TYPE_ENTRY_SIZE;
        if num_event_types == 0 {
            return Ok(());
        }
        if num_event_types as usize != self.profile.file_attrs.len() {
            return Err(Error::format(format!(
                "number of event types {num_event_types} does not match the number of \
                 file attributes {}",
                self.profile.file_attrs.len()
            )));
        }
        if num_event_types * EVENT_TYPE_ENTRY_SIZE != size {
            return Err(Error::format(format!(
                "event types section size {size} is not a multiple of the entry size"
            )));
        }
        let mut cur = Cursor::new(data);
        cur.set_position(offset);
        for i in 0..num_event_types as usize {
            self.read_event_type::<T>(&mut cur, i, 64)?;
        }
        Ok(())
    }

    /// One entry of the obsolete event-type table: the event id followed by
    /// a fixed-size name field.
    fn read_event_type<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        attr_idx: usize,
        name_len: usize,
    ) -> Result<()> {
        let event_id = cur.read_u64::<T>()?;
        let mut name_bytes = vec![0u8; name_len];
        cur.read_exact(&mut name_bytes)?;
        let name_end = memchr::memchr(0, &name_bytes).unwrap_or(name_len);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let attr = self
            .profile
            .file_attrs
            .get_mut(attr_idx)
            .ok_or_else(|| Error::format("more event types than attributes"))?;
        if event_id != attr.attr.config {
            return Err(Error::format(format!(
                "event type id {event_id} does not match attr.config {}",
                attr.attr.config
            )));
        }
        attr.name = Some(name.clone());
        self.profile.event_types.push(PerfEventType {
            id: event_id,
            name,
        });
        self.num_event_types_read += 1;
        Ok(())
    }

    // ---- metadata trailer ----

    fn read_metadata<T: ByteOrder>(
        &mut self,
        data: &[u8],
        (data_offset, data_size): (u64, u64),
    ) -> Result<()> {
        let mut cur = Cursor::new(data);
        cur.set_position(data_offset + data_size);

        // One descriptor per set mask bit, in ascending bit order, followed
        // by the blobs. Unsupported kinds still have descriptors; their
        // blobs are skipped.
        let num_sections = self.profile.metadata_mask.count_ones() as usize;
        let mut sections = Vec::with_capacity(num_sections);
        for _ in 0..num_sections {
            sections.push(read_file_section::<T>(&mut cur, data.len())?);
        }

        let mut section_iter = sections.into_iter();
        for feature in HEADER_FIRST_FEATURE..HEADER_LAST_FEATURE {
            if !self.profile.metadata_bit(feature) {
                continue;
            }
            let (offset, size) = section_iter
                .next()
                .ok_or_else(|| Error::format("metadata descriptor table is too short"))?;
            cur.set_position(offset);
            self.read_metadata_blob::<T>(&mut cur, feature, size)?;
        }
        Ok(())
    }

    fn read_metadata_blob<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        feature: u32,
        size: u64,
    ) -> Result<()> {
        let remaining = cur.get_ref().len() as u64 - cur.position();
        if size > remaining {
            return Err(Error::Truncation {
                what: "metadata section",
                declared: size,
                remaining,
            });
        }
        let begin = cur.position();

        match feature {
            HEADER_TRACING_DATA => {
                let mut tracing = vec![0u8; size as usize];
                cur.read_exact(&mut tracing)?;
                self.profile.tracing_data = tracing;
            }
            HEADER_BUILD_ID => self.read_build_id_metadata::<T>(cur, size)?,
            HEADER_HOSTNAME => {
                self.profile.string_metadata.hostname = read_optional_string::<T>(cur, size)?
            }
            HEADER_OSRELEASE => {
                self.profile.string_metadata.kernel_version = read_optional_string::<T>(cur, size)?
            }
            HEADER_VERSION => {
                self.profile.string_metadata.perf_version = read_optional_string::<T>(cur, size)?
            }
            HEADER_ARCH => {
                self.profile.string_metadata.architecture = read_optional_string::<T>(cur, size)?
            }
            HEADER_CPUDESC => {
                self.profile.string_metadata.cpu_description = read_optional_string::<T>(cur, size)?
            }
            HEADER_CPUID => {
                self.profile.string_metadata.cpu_id = read_optional_string::<T>(cur, size)?
            }
            HEADER_CMDLINE => self.read_cmdline_metadata::<T>(cur, size)?,
            HEADER_NRCPUS => self.read_uint32_metadata::<T>(cur, feature, size)?,
            HEADER_TOTAL_MEM => self.read_uint64_metadata::<T>(cur, feature, size)?,
            HEADER_EVENT_DESC => self.read_event_desc_metadata::<T>(cur)?,
            HEADER_CPU_TOPOLOGY => self.read_cpu_topology_metadata::<T>(cur, size)?,
            HEADER_NUMA_TOPOLOGY => self.read_numa_topology_metadata::<T>(cur)?,
            HEADER_BRANCH_STACK => {}
            HEADER_PMU_MAPPINGS => self.read_pmu_mappings_metadata::<T>(cur, size)?,
            HEADER_GROUP_DESC => self.read_group_desc_metadata::<T>(cur)?,
            _ => {
                log::info!(
                    "unsupported metadata type {}, skipping",
                    metadata_name(feature)
                );
            }
        }

        let consumed = cur.position() - begin;
        if consumed != size {
            log::warn!(
                "skipping {} unread bytes of metadata {}",
                size as i64 - consumed as i64,
                metadata_name(feature)
            );
            cur.set_position(begin + size);
        }
        Ok(())
    }

    fn read_build_id_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        size: u64,
    ) -> Result<()> {
        let mut remaining = size;
        while remaining > 0 {
            let header = read_event_header::<T>(cur)?;
            if header.size as u64 > remaining {
                return Err(Error::Truncation {
                    what: "build id record",
                    declared: header.size as u64,
                    remaining,
                });
            }
            self.read_build_id_record::<T>(cur, header)?;
            remaining -= header.size as u64;
        }
        Ok(())
    }

    /// The build-id record body after its header: pid, 24 bytes of hash
    /// storage, then the filename padded to u64 alignment.
    fn read_build_id_record<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        header: EventHeader,
    ) -> Result<()> {
        const FIXED: usize = PERF_EVENT_HEADER_SIZE + 4 + 24;
        if (header.size as usize) < FIXED {
            return Err(Error::format(format!(
                "build id record size {} is less than its fixed size {FIXED}",
                header.size
            )));
        }
        let pid = cur.read_i32::<T>()?;
        let mut hash_storage = [0u8; 24];
        cur.read_exact(&mut hash_storage)?;

        let path_len = header.size as usize - FIXED;
        let mut path_bytes = vec![0u8; path_len];
        cur.read_exact(&mut path_bytes)?;
        let path_end = memchr::memchr(0, &path_bytes).unwrap_or(path_len);
        let filename = String::from_utf8_lossy(&path_bytes[..path_end]).into_owned();

        // Newer producers record the hash length; older ones zero-pad, and
        // the length has to be detected.
        let (len, size) = if header.misc & PERF_RECORD_MISC_BUILD_ID_SIZE != 0 {
            let recorded = hash_storage[20].min(BUILD_ID_SIZE as u8);
            (recorded as usize, Some(recorded))
        } else {
            (detect_build_id_len(&hash_storage[..BUILD_ID_SIZE]), None)
        };

        self.profile.build_ids.push(BuildIdRecord {
            misc: header.misc,
            pid,
            build_id: hash_storage[..len].to_vec(),
            size,
            filename,
            is_injected: false,
        });
        Ok(())
    }

    fn read_cmdline_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        size: u64,
    ) -> Result<()> {
        let begin = cur.position();
        let mut count = cur.read_u32::<T>()?;
        let mut tokens = Vec::new();
        while count > 0 && cur.position() - begin < size {
            tokens.push(read_string_with_size::<T>(cur)?);
            count -= 1;
        }
        self.profile.string_metadata.perf_command_line_whole = Some(tokens.join(" "));
        self.profile.string_metadata.perf_command_line_tokens = tokens;
        Ok(())
    }

    fn read_uint32_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        type_: u32,
        size: u64,
    ) -> Result<()> {
        let mut data = Vec::new();
        let mut remaining = size;
        while remaining >= 4 {
            data.push(cur.read_u32::<T>()?);
            remaining -= 4;
        }
        if data.is_empty() {
            return Err(Error::format(format!(
                "no uint32 metadata available for {}",
                metadata_name(type_)
            )));
        }
        self.profile
            .uint32_metadata
            .push(PerfUint32Metadata { type_, data });
        Ok(())
    }

    fn read_uint64_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        type_: u32,
        size: u64,
    ) -> Result<()> {
        let mut data = Vec::new();
        let mut remaining = size;
        while remaining >= 8 {
            data.push(cur.read_u64::<T>()?);
            remaining -= 8;
        }
        if data.is_empty() {
            return Err(Error::format(format!(
                "no uint64 metadata available for {}",
                metadata_name(type_)
            )));
        }
        self.profile
            .uint64_metadata
            .push(PerfUint64Metadata { type_, data });
        Ok(())
    }

    /// EVENT_DESC metadata: the modern carrier of attributes and event
    /// names. Replaces anything read from the older sections.
    fn read_event_desc_metadata<T: ByteOrder>(&mut self, cur: &mut Cursor<&[u8]>) -> Result<()> {
        let nr_events = cur.read_u32::<T>()?;
        let _attr_size = cur.read_u32::<T>()?;

        self.attr_first_ids_seen.clear();
        self.attr_configs_seen.clear();
        self.profile.file_attrs.clear();
        self.profile.event_types.clear();

        for _ in 0..nr_events {
            let attr = PerfEventAttr::parse::<_, T>(cur, None, self.cross_endian)?;
            let nr_ids = cur.read_u32::<T>()?;
            let name = read_string_with_size::<T>(cur)?;
            let mut ids = Vec::with_capacity(nr_ids as usize);
            for _ in 0..nr_ids {
                ids.push(cur.read_u64::<T>()?);
            }
            self.profile.event_types.push(PerfEventType {
                id: attr.config,
                name: name.clone(),
            });
            self.add_attr(PerfFileAttr {
                attr,
                ids,
                name: Some(name),
            })?;
        }
        Ok(())
    }

    fn read_cpu_topology_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        size: u64,
    ) -> Result<()> {
        let begin = cur.position();
        let num_core_siblings = cur.read_u32::<T>()?;
        if num_core_siblings as u64 > size {
            return Err(Error::format(format!(
                "implausible core sibling count {num_core_siblings}"
            )));
        }
        let mut topology = CpuTopologyMetadata::default();
        for _ in 0..num_core_siblings {
            topology.core_siblings.push(read_string_with_size::<T>(cur)?);
        }
        let num_thread_siblings = cur.read_u32::<T>()?;
        if num_thread_siblings as u64 > size {
            return Err(Error::format(format!(
                "implausible thread sibling count {num_thread_siblings}"
            )));
        }
        for _ in 0..num_thread_siblings {
            topology
                .thread_siblings
                .push(read_string_with_size::<T>(cur)?);
        }

        // Newer producers append core and socket ids, one pair per CPU; the
        // CPU count comes from previously read NRCPUS metadata.
        if size > cur.position() - begin {
            let nrcpus = self
                .profile
                .uint32_metadata
                .iter()
                .find(|m| m.type_ == HEADER_NRCPUS)
                .and_then(|m| m.data.first())
                .copied()
                .unwrap_or(0);
            if nrcpus == 0 {
                return Err(Error::format(
                    "NRCPUS metadata was not read before CPU_TOPOLOGY metadata",
                ));
            }
            for _ in 0..nrcpus {
                topology.available_cpus.push(PerfCpu {
                    core_id: cur.read_u32::<T>()?,
                    socket_id: cur.read_u32::<T>()?,
                });
            }
        }
        self.profile.cpu_topology = Some(topology);
        Ok(())
    }

    fn read_numa_topology_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
    ) -> Result<()> {
        let num_nodes = cur.read_u32::<T>()?;
        for _ in 0..num_nodes {
            self.profile.numa_topology.push(NumaTopologyNode {
                id: cur.read_u32::<T>()?,
                total_memory: cur.read_u64::<T>()?,
                free_memory: cur.read_u64::<T>()?,
                cpu_list: read_string_with_size::<T>(cur)?,
            });
        }
        Ok(())
    }

    fn read_pmu_mappings_metadata<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        size: u64,
    ) -> Result<()> {
        let begin = cur.position();
        let num_mappings = cur.read_u32::<T>()?;
        // Piped producers before perf 4.14 always recorded a zero count;
        // keep reading to the section end in that case.
        let mut i = 0u32;
        while i < num_mappings || cur.position() - begin < size {
            self.profile.pmu_mappings.push(PmuMapping {
                type_: cur.read_u32::<T>()?,
                name: read_string_with_size::<T>(cur)?,
            });
            i += 1;
        }
        if cur.position() - begin != size {
            return Err(Error::format(
                "PMU mappings size from the header does not match the read size",
            ));
        }
        Ok(())
    }

    fn read_group_desc_metadata<T: ByteOrder>(&mut self, cur: &mut Cursor<&[u8]>) -> Result<()> {
        let num_groups = cur.read_u32::<T>()?;
        for _ in 0..num_groups {
            self.profile.group_desc.push(GroupDesc {
                name: read_string_with_size::<T>(cur)?,
                leader_idx: cur.read_u32::<T>()?,
                num_members: cur.read_u32::<T>()?,
            });
        }
        Ok(())
    }

    // ---- the event stream ----

    fn read_data_section<T: ByteOrder>(
        &mut self,
        data: &[u8],
        (offset, size): (u64, u64),
    ) -> Result<()> {
        let mut cur = Cursor::new(data);
        cur.set_position(offset);
        let mut remaining = size;
        while remaining != 0 {
            let header = read_event_header::<T>(&mut cur)?;
            let read_size = self.read_nonheader_event::<T>(&mut cur, header)?;
            let total = PERF_EVENT_HEADER_SIZE as u64 + read_size;
            if total > remaining {
                return Err(Error::Truncation {
                    what: "event",
                    declared: total,
                    remaining,
                });
            }
            remaining -= total;
        }
        log::debug!("number of events stored: {}", self.profile.events.len());
        Ok(())
    }

    /// Reads one kernel or user event whose header has already been
    /// consumed. Returns the number of bytes read past the header.
    fn read_nonheader_event<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        header: EventHeader,
    ) -> Result<u64> {
        let body_size = header.size as usize - PERF_EVENT_HEADER_SIZE;

        if !is_supported_kernel_type(header.type_) && !is_supported_user_type(header.type_) {
            if self.cross_endian {
                // Without a field table there is no way to byte-swap an
                // unknown record.
                return Err(Error::CrossEndianUnsupportedEvent(event_name(header.type_)));
            }
            log::warn!("skipping unsupported event {}", event_name(header.type_));
            cur.seek(SeekFrom::Current(body_size as i64))?;
            return Ok(body_size as u64);
        }

        if self.registry.is_empty() {
            return Err(Error::format(
                "no sample info reader available to read perf events",
            ));
        }

        let fixed = fixed_payload_size(header.type_).unwrap();
        if (header.size as usize) < fixed {
            return Err(Error::format(format!(
                "event size {} of {} is below its fixed payload size {fixed}",
                header.size,
                event_name(header.type_)
            )));
        }

        // MMAPs synthesized after a /proc/<pid>/maps parse timeout describe
        // only a truncated address space.
        if matches!(header.type_, PERF_RECORD_MMAP | PERF_RECORD_MMAP2)
            && header.misc & PERF_RECORD_MISC_PROC_MAP_PARSE_TIMEOUT != 0
        {
            log::warn!("skipping truncated mmap from {}", event_name(header.type_));
            cur.seek(SeekFrom::Current(body_size as i64))?;
            return Ok(body_size as u64);
        }

        let start = cur.position() as usize;
        let data = *cur.get_ref();
        if start + body_size > data.len() {
            return Err(Error::Truncation {
                what: "event body",
                declared: body_size as u64,
                remaining: (data.len() - start) as u64,
            });
        }
        let body = &data[start..start + body_size];
        let mut record = codec::parse_event::<T>(header, body, &self.registry)?;
        cur.seek(SeekFrom::Current(body_size as i64))?;
        let mut read_size = body_size as u64;

        // A buggy perf emits zero-length kernel MMAPs when kernel samples
        // were excluded; they would shadow every user mapping.
        if let Some((_, _, len, _, _)) = record.mmap_parts() {
            let first_attr_excludes_kernel = self
                .profile
                .file_attrs
                .first()
                .map(|a| a.attr.exclude_kernel())
                .unwrap_or(false);
            if first_attr_excludes_kernel
                && header.misc & PERF_RECORD_MISC_CPUMODE_MASK == PERF_RECORD_MISC_KERNEL
                && len == 0
            {
                log::warn!(
                    "skipping zero length kernel mmap event from a perf.data collected \
                     in userspace"
                );
                return Ok(read_size);
            }
        }

        // MMAP2 records may carry the file's build id inline; surface the
        // first one per filename as a build-id record.
        if let EventData::Mmap2(m) = &record.data {
            if let Mmap2FileId::BuildId(build_id) = &m.file_id {
                if !self.filenames_with_inline_build_id.contains(&m.filename) {
                    self.profile.build_ids.push(BuildIdRecord {
                        misc: header.misc,
                        pid: -1,
                        build_id: build_id.clone(),
                        size: Some(build_id.len() as u8),
                        filename: m.filename.clone(),
                        is_injected: false,
                    });
                    self.filenames_with_inline_build_id
                        .insert(m.filename.clone());
                }
            }
        }

        // AUXTRACE trace bytes follow the record.
        if let EventData::Auxtrace(auxtrace) = &mut record.data {
            let trace_size = auxtrace.size;
            let remaining = data.len() as u64 - cur.position();
            if trace_size > remaining {
                return Err(Error::Truncation {
                    what: "auxtrace trace data",
                    declared: trace_size,
                    remaining,
                });
            }
            if self.cross_endian {
                log::warn!("cannot byte-swap trace data of an AUXTRACE record");
            }
            let pos = cur.position() as usize;
            auxtrace.trace_data = data[pos..pos + trace_size as usize].to_vec();
            cur.seek(SeekFrom::Current(trace_size as i64))?;
            read_size += trace_size;
        }

        self.profile.events.push(record);
        Ok(read_size)
    }

    // ---- piped mode ----

    fn read_piped_data<T: ByteOrder>(
        &mut self,
        data: &[u8],
        cur: &mut Cursor<&[u8]>,
    ) -> Result<()> {
        while (cur.position() as usize) < data.len() {
            let header = read_event_header::<T>(cur)?;
            if is_supported_header_type(header.type_) {
                self.read_header_event::<T>(cur, header)?;
            } else {
                self.read_nonheader_event::<T>(cur, header)?;
            }
        }

        // Obsolete HEADER_EVENT_TYPE records can stand in for EVENT_DESC
        // when every attribute got a name from them.
        if !self.profile.metadata_bit(HEADER_EVENT_DESC)
            && !self.profile.file_attrs.is_empty()
            && self.num_event_types_read == self.profile.file_attrs.len()
        {
            self.profile.set_metadata_bit(HEADER_EVENT_DESC);
        }
        Ok(())
    }

    fn read_header_event<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        header: EventHeader,
    ) -> Result<()> {
        let body_size = header.size as usize - PERF_EVENT_HEADER_SIZE;
        match header.type_ {
            PERF_RECORD_HEADER_ATTR => self.read_attr_event::<T>(cur, body_size),
            PERF_RECORD_HEADER_EVENT_TYPE => {
                let name_len = body_size.checked_sub(8).ok_or_else(|| {
                    Error::format(format!(
                        "event type record size {} cannot hold an event id",
                        header.size
                    ))
                })?;
                let idx = self.num_event_types_read;
                self.read_event_type::<T>(cur, idx, name_len)
            }
            PERF_RECORD_HEADER_TRACING_DATA => {
                // The record's own size field is a lie; the true size of the
                // tracing data is the first word of the body, and the data
                // itself follows the record.
                self.profile.set_metadata_bit(HEADER_TRACING_DATA);
                let size = cur.read_u32::<T>()?;
                self.read_metadata_blob::<T>(cur, HEADER_TRACING_DATA, size as u64)
            }
            PERF_RECORD_HEADER_BUILD_ID => {
                self.profile.set_metadata_bit(HEADER_BUILD_ID);
                self.read_build_id_record::<T>(cur, header)
            }
            PERF_RECORD_HEADER_FEATURE => {
                if body_size < 8 {
                    return Err(Error::format(format!(
                        "header feature event size {} is too small",
                        header.size
                    )));
                }
                let feat_id = cur.read_u64::<T>()? as u32;
                match feat_id {
                    HEADER_TRACING_DATA | HEADER_BUILD_ID | HEADER_BRANCH_STACK
                    | HEADER_GROUP_DESC => {
                        return Err(Error::format(format!(
                            "feature {} must arrive in its own record type, not in \
                             HEADER_FEATURE",
                            metadata_name(feat_id)
                        )));
                    }
                    _ => {}
                }
                if feat_id < 64 {
                    self.profile.set_metadata_bit(feat_id);
                }
                self.read_metadata_blob::<T>(cur, feat_id, (body_size - 8) as u64)
            }
            _ => unreachable!("checked by is_supported_header_type"),
        }
    }

    /// A PERF_RECORD_HEADER_ATTR body: the attr followed by its event IDs.
    /// Attrs arrive repeatedly (and also via EVENT_DESC); duplicates are
    /// dropped by first ID, or by config for attrs that carry no IDs.
    fn read_attr_event<T: ByteOrder>(
        &mut self,
        cur: &mut Cursor<&[u8]>,
        body_size: usize,
    ) -> Result<()> {
        let begin = cur.position();
        let attr = PerfEventAttr::parse::<_, T>(cur, None, self.cross_endian)?;
        let attr_bytes = (cur.position() - begin) as usize;
        let num_ids = body_size
            .checked_sub(attr_bytes)
            .ok_or_else(|| {
                Error::format(format!(
                    "attr record declares {body_size} payload bytes but its attr occupies \
                     {attr_bytes}"
                ))
            })?
            / 8;
        let mut ids = Vec::with_capacity(num_ids);
        for _ in 0..num_ids {
            ids.push(cur.read_u64::<T>()?);
        }

        if ids.is_empty() && self.attr_configs_seen.contains(&attr.config) {
            return Ok(());
        }
        if let Some(first_id) = ids.first() {
            if self.attr_first_ids_seen.contains(first_id) {
                return Ok(());
            }
        }
        self.add_attr(PerfFileAttr {
            attr,
            ids,
            name: None,
        })
    }

    fn add_attr(&mut self, attr: PerfFileAttr) -> Result<()> {
        self.registry.add_attr(&attr)?;
        if let Some(first_id) = attr.ids.first() {
            self.attr_first_ids_seen.insert(*first_id);
        }
        self.attr_configs_seen.insert(attr.attr.config);
        self.profile.file_attrs.push(attr);
        Ok(())
    }
}

fn read_event_header<T: ByteOrder>(cur: &mut Cursor<&[u8]>) -> Result<EventHeader> {
    let remaining_before = cur.get_ref().len() as u64 - cur.position();
    let type_ = cur.read_u32::<T>()?;
    let misc = cur.read_u16::<T>()?;
    let size = cur.read_u16::<T>()?;
    if (size as usize) < PERF_EVENT_HEADER_SIZE {
        return Err(Error::EventSizeTooSmall {
            name: event_name(type_),
            size,
        });
    }
    let remaining = remaining_before - PERF_EVENT_HEADER_SIZE as u64;
    if (size as usize - PERF_EVENT_HEADER_SIZE) as u64 > remaining {
        return Err(Error::Truncation {
            what: "event payload",
            declared: (size as usize - PERF_EVENT_HEADER_SIZE) as u64,
            remaining,
        });
    }
    Ok(EventHeader { type_, misc, size })
}

fn read_file_section<T: ByteOrder>(cur: &mut impl Read, file_len: usize) -> Result<(u64, u64)> {
    let offset = cur.read_u64::<T>()?;
    let size = cur.read_u64::<T>()?;
    if offset > file_len as u64 {
        return Err(Error::format(format!(
            "illegal section offset {offset} in perf data input of size {file_len}"
        )));
    }
    if size > file_len as u64 - offset {
        return Err(Error::Truncation {
            what: "file section",
            declared: size,
            remaining: file_len as u64 - offset,
        });
    }
    Ok((offset, size))
}

fn read_ids<T: ByteOrder>(data: &[u8], (offset, size): (u64, u64)) -> Result<Vec<u64>> {
    let mut cur = Cursor::new(data);
    cur.set_position(offset);
    let num_ids = size / 8;
    let mut ids = Vec::with_capacity(num_ids as usize);
    for _ in 0..num_ids {
        ids.push(cur.read_u64::<T>()?);
    }
    Ok(ids)
}

/// A length-prefixed string: u32 length, then that many bytes of NUL-padded
/// storage.
fn read_string_with_size<T: ByteOrder>(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cur.read_u32::<T>()? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(Error::Truncation {
            what: "string",
            declared: len as u64,
            remaining: remaining as u64,
        });
    }
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    let end = memchr::memchr(0, &bytes).unwrap_or(len);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

fn read_optional_string<T: ByteOrder>(
    cur: &mut Cursor<&[u8]>,
    size: u64,
) -> Result<Option<String>> {
    if size == 0 {
        return Ok(Some(String::new()));
    }
    read_string_with_size::<T>(cur).map(Some)
}
