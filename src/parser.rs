//! Post-read processing: per-process address-space reconstruction over the
//! event stream, sample-to-binary resolution, optional mapping combination
//! and huge-page deduction, optional remapping into a dense synthetic
//! address space, and best-effort build-id reconciliation.

use std::collections::{HashMap, HashSet};

use crate::address_map::{AddressSpace, Mapping};
use crate::buildid::{BuildIdSource, ElfBuildIdSource};
use crate::codec;
use crate::consts::*;
use crate::dso::{read_missing_build_id, DsoTable};
use crate::error::{Error, Result};
use crate::profile::{BuildIdRecord, ParserStats, PerfData};
use crate::record::{EventData, EventRecord, Mmap2FileId, SampleEvent, KERNEL_PID};
use crate::sample_info::SampleInfoRegistry;

/// Remapped kernel ranges live above this base; unresolved addresses are
/// ORed with it so they stay recognizable.
const KERNEL_REMAP_BASE: u64 = 1 << 63;

/// Files that transparent huge pages report as the backing of executable
/// mappings.
fn is_anon(filename: &str) -> bool {
    filename == "//anon" || filename.starts_with("/anon_hugepage")
}

pub struct ParserOptions {
    /// Rewrite addresses into a dense synthetic space.
    pub do_remap: bool,
    /// Stable-sort events by time before processing (only possible when all
    /// attributes record timestamps).
    pub sort_events_by_time: bool,
    /// Merge mappings that are contiguous in both virtual and file space.
    pub combine_mappings: bool,
    /// Treat `//anon` neighbors of file mappings as huge-page-backed pieces
    /// of the file.
    pub deduce_huge_page_mappings: bool,
    /// Read build ids of sampled binaries from the filesystem when the
    /// profile does not carry them.
    pub read_missing_buildids: bool,
    /// Fail parsing when fewer than this percentage of samples resolve.
    pub sample_mapping_percentage_threshold: f32,
    /// Record types to drop from the profile.
    pub event_types_to_skip: HashSet<u32>,
    /// Invoked synchronously for every sample, after resolution.
    pub sample_event_callback: Option<Box<dyn FnMut(&SampleEvent)>>,
    /// The filesystem capability used for build-id read-back.
    pub build_id_source: Box<dyn BuildIdSource>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            do_remap: false,
            sort_events_by_time: true,
            combine_mappings: true,
            deduce_huge_page_mappings: true,
            read_missing_buildids: false,
            sample_mapping_percentage_threshold: 95.0,
            event_types_to_skip: HashSet::new(),
            sample_event_callback: None,
            build_id_source: Box::new(ElfBuildIdSource),
        }
    }
}

/// A resolved address: which binary it fell into and at which file offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DsoAndOffset {
    pub dso_name: String,
    pub offset: u64,
    pub build_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedBranch {
    pub from: Option<DsoAndOffset>,
    pub to: Option<DsoAndOffset>,
    pub mispredicted: bool,
    pub predicted: bool,
    pub cycles: u16,
}

/// Derived information for one surviving event, parallel to the profile's
/// event list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedEvent {
    pub event_index: usize,
    pub dso_and_offset: Option<DsoAndOffset>,
    pub data_dso_and_offset: Option<DsoAndOffset>,
    pub branch_stack: Vec<ParsedBranch>,
}

/// Streams the profile's events, reconstructing address spaces and
/// resolving samples. Mutates the profile in place: mappings may be
/// rewritten or merged, addresses remapped, build ids supplemented.
pub struct PerfParser<'a> {
    profile: &'a mut PerfData,
    options: ParserOptions,
    parsed_events: Vec<ParsedEvent>,
    spaces: HashMap<u32, AddressSpace>,
    dsos: DsoTable,
    stats: ParserStats,
}

impl<'a> PerfParser<'a> {
    pub fn new(profile: &'a mut PerfData, options: ParserOptions) -> Self {
        Self {
            profile,
            options,
            parsed_events: Vec::new(),
            spaces: HashMap::new(),
            dsos: DsoTable::new(),
            stats: ParserStats::default(),
        }
    }

    pub fn parsed_events(&self) -> &[ParsedEvent] {
        &self.parsed_events
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }

    pub fn dsos(&self) -> &DsoTable {
        &self.dsos
    }

    pub fn parse(&mut self) -> Result<()> {
        let registry = self.profile.build_registry()?;
        if self.options.sort_events_by_time {
            self.profile.maybe_sort_events_by_time();
        }

        let events = std::mem::take(&mut self.profile.events);
        let mut out = Vec::with_capacity(events.len());
        let mut exited_pids = Vec::new();

        for mut record in events {
            let type_ = record.header.type_;
            if self.options.event_types_to_skip.contains(&type_) {
                continue;
            }
            match type_ {
                // Round markers only delimit flush points during recording.
                PERF_RECORD_FINISHED_ROUND => continue,
                PERF_RECORD_MMAP | PERF_RECORD_MMAP2 => {
                    self.process_mmap(record, &mut out, &registry)?;
                }
                PERF_RECORD_SAMPLE => {
                    let parsed = self.process_sample(&mut record, out.len());
                    out.push(record);
                    self.parsed_events.push(parsed);
                }
                PERF_RECORD_FORK => {
                    self.stats.num_fork_events += 1;
                    if let EventData::Fork(fork) = &record.data {
                        // pid == ppid is a new thread, which shares the space.
                        if fork.pid != fork.ppid {
                            if let Some(parent) = self.spaces.get(&fork.ppid) {
                                self.spaces.insert(fork.pid, parent.clone());
                            }
                        }
                    }
                    self.push_plain(record, &mut out);
                }
                PERF_RECORD_EXIT => {
                    self.stats.num_exit_events += 1;
                    if let EventData::Exit(exit) = &record.data {
                        if exit.pid == exit.tid {
                            exited_pids.push(exit.pid);
                        }
                    }
                    self.push_plain(record, &mut out);
                }
                _ => self.push_plain(record, &mut out),
            }
        }
        self.profile.events = out;

        for pid in exited_pids {
            self.spaces.remove(&pid);
        }

        self.stats.did_remap = self.options.do_remap;
        self.check_mapping_threshold()?;
        self.reconcile_build_ids();
        self.profile.stats = self.stats;
        Ok(())
    }

    fn push_plain(&mut self, record: EventRecord, out: &mut Vec<EventRecord>) {
        self.parsed_events.push(ParsedEvent {
            event_index: out.len(),
            ..Default::default()
        });
        out.push(record);
    }

    fn process_mmap(
        &mut self,
        mut record: EventRecord,
        out: &mut Vec<EventRecord>,
        registry: &SampleInfoRegistry,
    ) -> Result<()> {
        let (pid, tid, start, len, mut pgoff, mut filename) = match &record.data {
            EventData::Mmap(m) => (m.pid, m.tid, m.start, m.len, m.pgoff, m.filename.clone()),
            EventData::Mmap2(m) => (m.pid, m.tid, m.start, m.len, m.pgoff, m.filename.clone()),
            _ => unreachable!(),
        };
        let remap_base = if pid == KERNEL_PID {
            KERNEL_REMAP_BASE
        } else {
            0
        };
        let space = self
            .spaces
            .entry(pid)
            .or_insert_with(|| AddressSpace::new(remap_base));

        if self.options.deduce_huge_page_mappings {
            if is_anon(&filename) {
                // A huge-page region right after a file mapping continues
                // that file.
                if let Some((_, prev)) = space.prev_adjacent(start) {
                    if !is_anon(&prev.filename) {
                        filename = prev.filename.clone();
                        pgoff = prev.pgoff + prev.len;
                    }
                }
            } else if pgoff > 0 {
                // A file mapping right after a bare huge-page region names
                // the region's backing file retroactively.
                let backfill = space.prev_adjacent(start).and_then(|(prev_start, prev)| {
                    (is_anon(&prev.filename) && pgoff >= prev.len).then_some(prev_start)
                });
                if let Some(prev_start) = backfill {
                    let prev = space.get_mut(prev_start).unwrap();
                    prev.filename = filename.clone();
                    prev.pgoff = pgoff - prev.len;
                    let prev_filename = prev.filename.clone();
                    let prev_pgoff = prev.pgoff;
                    if let Some(idx) = prev.event_index {
                        rewrite_mmap_event(&mut out[idx], |_, p, f| {
                            *p = prev_pgoff;
                            *f = prev_filename.clone();
                        });
                        out[idx].header.size = codec::event_size(&out[idx], registry)? as u16;
                    }
                }
            }
        }

        if self.options.combine_mappings {
            let merge_into = space.prev_adjacent(start).and_then(|(prev_start, prev)| {
                (prev.filename == filename && prev.pgoff + prev.len == pgoff)
                    .then_some(prev_start)
            });
            if let Some(prev_start) = merge_into {
                let do_remap = self.options.do_remap;
                let new_len = {
                    let prev = space.get_mut(prev_start).unwrap();
                    prev.len += len;
                    prev.len
                };
                if do_remap {
                    let old = space.get_mut(prev_start).unwrap().remapped_start.take();
                    if let Some(old) = old {
                        space.free_remapped(old);
                    }
                    let remapped = space.allocate_remapped(new_len);
                    space.get_mut(prev_start).unwrap().remapped_start = Some(remapped);
                }
                let prev = space.get_mut(prev_start).unwrap();
                let remapped_start = prev.remapped_start;
                if let Some(idx) = prev.event_index {
                    rewrite_mmap_event(&mut out[idx], |l, _, _| *l = new_len);
                    if let Some(remapped) = remapped_start {
                        rewrite_mmap_start(&mut out[idx], remapped);
                    }
                }
                // The merged record is dropped; the first constituent
                // already stands for the whole range.
                return Ok(());
            }
        }

        space.remove_overlapping(start, len);
        let remapped_start = self
            .options
            .do_remap
            .then(|| space.allocate_remapped(len));

        // Reflect deduction and remapping in the stored event.
        rewrite_mmap_event(&mut record, |_, p, f| {
            *p = pgoff;
            *f = filename.clone();
        });
        if let Some(remapped) = remapped_start {
            rewrite_mmap_start(&mut record, remapped);
            if pid == KERNEL_PID {
                rewrite_mmap_event(&mut record, |_, p, _| *p = 0);
            }
        }
        record.header.size = codec::event_size(&record, registry)? as u16;

        // DSO bookkeeping feeds build-id reconciliation later.
        {
            let dso = self.dsos.entry(&filename);
            if dso.first_pid.is_none() {
                dso.first_pid = Some(pid);
                dso.first_tid = Some(tid);
            }
            if let EventData::Mmap2(m) = &record.data {
                if let Mmap2FileId::InodeAndVersion { maj, min, ino, .. } = m.file_id {
                    dso.maj.get_or_insert(maj);
                    dso.min.get_or_insert(min);
                    dso.ino.get_or_insert(ino);
                }
            }
        }

        let event_index = out.len();
        self.parsed_events.push(ParsedEvent {
            event_index,
            ..Default::default()
        });
        out.push(record);
        self.stats.num_mmap_events += 1;

        space.insert(
            start,
            Mapping {
                len,
                pgoff,
                filename,
                event_index: Some(event_index),
                remapped_start,
            },
        );
        Ok(())
    }

    fn process_sample(&mut self, record: &mut EventRecord, event_index: usize) -> ParsedEvent {
        let EventData::Sample(sample) = &mut record.data else {
            unreachable!()
        };
        self.stats.num_sample_events += 1;
        let pid = sample.pid;
        let do_remap = self.options.do_remap;
        let mut parsed = ParsedEvent {
            event_index,
            ..Default::default()
        };

        if let Some(ip) = sample.ip {
            match resolve(&self.spaces, pid, ip) {
                Some(resolved) => {
                    self.stats.num_sample_events_mapped += 1;
                    self.dsos.entry(&resolved.dso_name).hit = true;
                    if do_remap {
                        sample.ip = Some(resolved.remapped.unwrap_or(ip));
                    }
                    parsed.dso_and_offset = Some(resolved.into_dso_and_offset());
                }
                None => {
                    if do_remap {
                        sample.ip = Some(ip | KERNEL_REMAP_BASE);
                    }
                }
            }
        }

        if let Some(addr) = sample.addr {
            // A zero data address means "no data address".
            if addr != 0 {
                self.stats.num_data_sample_events += 1;
                match resolve(&self.spaces, pid, addr) {
                    Some(resolved) => {
                        self.stats.num_data_sample_events_mapped += 1;
                        self.dsos.entry(&resolved.dso_name).hit = true;
                        if do_remap {
                            sample.addr = Some(resolved.remapped.unwrap_or(addr));
                        }
                        parsed.data_dso_and_offset = Some(resolved.into_dso_and_offset());
                    }
                    None => {
                        if do_remap {
                            sample.addr = Some(addr | KERNEL_REMAP_BASE);
                        }
                    }
                }
            }
        }

        if let Some(branch_stack) = &mut sample.branch_stack {
            for entry in &mut branch_stack.entries {
                let from = resolve(&self.spaces, pid, entry.from);
                let to = resolve(&self.spaces, pid, entry.to);
                if do_remap {
                    entry.from = from
                        .as_ref()
                        .and_then(|r| r.remapped)
                        .unwrap_or(entry.from | KERNEL_REMAP_BASE);
                    entry.to = to
                        .as_ref()
                        .and_then(|r| r.remapped)
                        .unwrap_or(entry.to | KERNEL_REMAP_BASE);
                }
                parsed.branch_stack.push(ParsedBranch {
                    from: from.map(Resolved::into_dso_and_offset),
                    to: to.map(Resolved::into_dso_and_offset),
                    mispredicted: entry.mispredicted,
                    predicted: entry.predicted,
                    cycles: entry.cycles,
                });
            }
        }

        if let Some(callback) = &mut self.options.sample_event_callback {
            callback(sample);
        }
        parsed
    }

    fn check_mapping_threshold(&self) -> Result<()> {
        let total = self.stats.num_sample_events;
        if total == 0 {
            return Ok(());
        }
        let mapped = self.stats.num_sample_events_mapped;
        let percentage = mapped as f32 / total as f32 * 100.0;
        if percentage < self.options.sample_mapping_percentage_threshold {
            return Err(Error::LowSampleMappingRatio {
                mapped,
                total,
                threshold: self.options.sample_mapping_percentage_threshold,
            });
        }
        Ok(())
    }

    /// Associates each DSO with a build id: from build-id records (which
    /// include inline MMAP2 build ids promoted by the reader), then from
    /// the filesystem for sampled binaries still missing one. Read-back
    /// results overwrite previously known build ids in the profile.
    fn reconcile_build_ids(&mut self) {
        for record in &self.profile.build_ids {
            self.dsos.entry(&record.filename).build_id = Some(record.build_id.clone());
        }

        if self.options.read_missing_buildids {
            let mut read_back = Vec::new();
            for dso in self.dsos.iter_mut() {
                if !dso.hit || dso.build_id.is_some() {
                    continue;
                }
                if let Some(build_id) =
                    read_missing_build_id(dso, self.options.build_id_source.as_ref())
                {
                    dso.build_id = Some(build_id.clone());
                    read_back.push((dso.name.clone(), build_id));
                }
            }
            for (filename, build_id) in read_back {
                match self
                    .profile
                    .build_ids
                    .iter_mut()
                    .find(|b| b.filename == filename)
                {
                    Some(record) => record.build_id = build_id,
                    None => self.profile.build_ids.push(BuildIdRecord {
                        misc: PERF_RECORD_MISC_USER,
                        pid: -1,
                        build_id,
                        size: None,
                        filename,
                        is_injected: false,
                    }),
                }
            }
        }

        for parsed in &mut self.parsed_events {
            for dso_and_offset in [&mut parsed.dso_and_offset, &mut parsed.data_dso_and_offset]
                .into_iter()
                .flatten()
            {
                dso_and_offset.build_id = self
                    .dsos
                    .get(&dso_and_offset.dso_name)
                    .and_then(|d| d.build_id.clone());
            }
            for branch in &mut parsed.branch_stack {
                for dso_and_offset in [&mut branch.from, &mut branch.to].into_iter().flatten() {
                    dso_and_offset.build_id = self
                        .dsos
                        .get(&dso_and_offset.dso_name)
                        .and_then(|d| d.build_id.clone());
                }
            }
        }
    }
}

struct Resolved {
    dso_name: String,
    offset: u64,
    remapped: Option<u64>,
}

impl Resolved {
    fn into_dso_and_offset(self) -> DsoAndOffset {
        DsoAndOffset {
            dso_name: self.dso_name,
            offset: self.offset,
            build_id: None,
        }
    }
}

/// Resolves an address against the process's space, falling back to the
/// kernel pseudo-process.
fn resolve(spaces: &HashMap<u32, AddressSpace>, pid: Option<u32>, addr: u64) -> Option<Resolved> {
    fn lookup(space: &AddressSpace, addr: u64) -> Option<Resolved> {
        space.lookup(addr).map(|(start, mapping)| Resolved {
            dso_name: mapping.filename.clone(),
            offset: addr - start + mapping.pgoff,
            remapped: mapping.remapped_start.map(|r| r + (addr - start)),
        })
    }
    if let Some(pid) = pid {
        if let Some(resolved) = spaces.get(&pid).and_then(|s| lookup(s, addr)) {
            return Some(resolved);
        }
    }
    spaces.get(&KERNEL_PID).and_then(|s| lookup(s, addr))
}

fn rewrite_mmap_event(record: &mut EventRecord, f: impl FnOnce(&mut u64, &mut u64, &mut String)) {
    match &mut record.data {
        EventData::Mmap(m) => f(&mut m.len, &mut m.pgoff, &mut m.filename),
        EventData::Mmap2(m) => f(&mut m.len, &mut m.pgoff, &mut m.filename),
        _ => {}
    }
}

fn rewrite_mmap_start(record: &mut EventRecord, start: u64) {
    match &mut record.data {
        EventData::Mmap(m) => m.start = start,
        EventData::Mmap2(m) => m.start = start,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::SampleFormat;
    use crate::reader::PerfReader;
    use crate::test_utils::PipedFileBuilder;

    fn no_threshold() -> ParserOptions {
        ParserOptions {
            sample_mapping_percentage_threshold: 0.0,
            ..Default::default()
        }
    }

    fn mmap_geometry(record: &EventRecord) -> (u64, u64, u64, String) {
        let (_, start, len, pgoff, filename) = record.mmap_parts().unwrap();
        (start, len, pgoff, filename.to_owned())
    }

    #[test]
    fn maps_sample_ips_and_remaps_them() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.mmap_event(1001, 0x1c1000, 0x1000, 0, "/usr/lib/foo.so", 1001, 1001);
        file.mmap_event(1001, 0x1c3000, 0x2000, 0x2000, "/usr/lib/bar.so", 1001, 1001);
        file.sample_event_ip_tid(0x1c1000, 1001, 1001);
        file.sample_event_ip_tid(0x1c100a, 1001, 1001);
        file.sample_event_ip_tid(0x1c3fff, 1001, 1001);
        file.sample_event_ip_tid(0x1c2bad, 1001, 1001); // not mapped

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut options = no_threshold();
        options.do_remap = true;
        let mut parser = PerfParser::new(&mut profile, options);
        parser.parse().unwrap();

        assert_eq!(parser.stats().num_mmap_events, 2);
        assert_eq!(parser.stats().num_sample_events, 4);
        assert_eq!(parser.stats().num_sample_events_mapped, 3);
        assert!(parser.stats().did_remap);

        let events = parser.parsed_events().to_vec();
        drop(parser);

        // Mappings were repacked densely.
        assert_eq!(mmap_geometry(&profile.events[0]).0, 0);
        let (start, len, pgoff, _) = mmap_geometry(&profile.events[1]);
        assert_eq!((start, len, pgoff), (0x1000, 0x2000, 0x2000));

        let dso = events[2].dso_and_offset.as_ref().unwrap();
        assert_eq!(dso.dso_name, "/usr/lib/foo.so");
        assert_eq!(dso.offset, 0);
        let dso = events[3].dso_and_offset.as_ref().unwrap();
        assert_eq!(dso.offset, 0xa);
        let dso = events[4].dso_and_offset.as_ref().unwrap();
        assert_eq!(dso.dso_name, "/usr/lib/bar.so");
        assert_eq!(dso.offset, 0x2fff);
        assert!(events[5].dso_and_offset.is_none());

        let sample_ip = |i: usize| match &profile.events[i].data {
            EventData::Sample(s) => s.ip.unwrap(),
            _ => panic!("not a sample"),
        };
        assert_eq!(sample_ip(2), 0x0);
        assert_eq!(sample_ip(3), 0xa);
        assert_eq!(sample_ip(4), 0x1fff);
        assert_eq!(sample_ip(5), 0x8000_0000_001c_2bad);
    }

    #[test]
    fn data_addresses_resolve_and_zero_is_ignored() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(
            SampleFormat::IP | SampleFormat::TID | SampleFormat::ADDR,
            true,
            &[],
        );
        file.mmap_event(1001, 0x1c1000, 0x1000, 0, "/usr/lib/foo.so", 1001, 1001);
        file.mmap_event(1001, 0x1c3000, 0x2000, 0x2000, "/usr/lib/bar.so", 1001, 1001);
        file.sample_event(0x1c1000, 1001, 1001, 0, 0x1c3100, &[]);
        file.sample_event(0x1c1004, 1001, 1001, 0, 0x1c7bad, &[]); // addr unmapped
        file.sample_event(0x1c1008, 1001, 1001, 0, 0, &[]); // addr zero

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, no_threshold());
        parser.parse().unwrap();

        assert_eq!(parser.stats().num_sample_events, 3);
        assert_eq!(parser.stats().num_sample_events_mapped, 3);
        assert_eq!(parser.stats().num_data_sample_events, 2);
        assert_eq!(parser.stats().num_data_sample_events_mapped, 1);

        let data_dso = parser.parsed_events()[2].data_dso_and_offset.as_ref().unwrap();
        assert_eq!(data_dso.dso_name, "/usr/lib/bar.so");
        assert_eq!(data_dso.offset, 0x2100);
        assert!(parser.parsed_events()[3].data_dso_and_offset.is_none());
        assert!(parser.parsed_events()[4].data_dso_and_offset.is_none());
    }

    #[test]
    fn kernel_mapping_resolves_samples_from_any_process() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.kernel_mmap_event(0, u64::MAX, 0, "[kernel.kallsyms]_text");
        file.mmap_event(1234, 0x7f008e000000, 0x2000000, 0, "/usr/lib/libfoo.so", 1234, 1234);
        file.sample_event_ip_tid(0x7f008e123456, 1234, 1235);
        file.sample_event_ip_tid(0x8000819e, 1234, 1235);

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, ParserOptions::default());
        parser.parse().unwrap();

        assert_eq!(parser.stats().num_sample_events_mapped, 2);
        let lib = parser.parsed_events()[2].dso_and_offset.as_ref().unwrap();
        assert_eq!(lib.dso_name, "/usr/lib/libfoo.so");
        assert_eq!(lib.offset, 0x123456);
        let kernel = parser.parsed_events()[3].dso_and_offset.as_ref().unwrap();
        assert_eq!(kernel.dso_name, "[kernel.kallsyms]_text");
        assert_eq!(kernel.offset, 0x8000819e);
    }

    #[test]
    fn huge_page_sandwich_collapses_into_one_mapping() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.mmap_event(1234, 0x40018000, 0x1e8000, 0, "/opt/chrome/chrome", 1234, 1234);
        file.mmap_event(1234, 0x40200000, 0x1c00000, 0, "//anon", 1234, 1234);
        file.mmap_event(
            1234,
            0x41e00000,
            0x4000000,
            0x1de8000,
            "/opt/chrome/chrome",
            1234,
            1234,
        );
        file.sample_event_ip_tid(0x40020400, 1234, 1235); // inside the anon stretch

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, no_threshold());
        parser.parse().unwrap();

        assert_eq!(parser.stats().num_mmap_events, 1);
        let sample = parser.parsed_events().last().unwrap();
        let dso = sample.dso_and_offset.as_ref().unwrap();
        assert_eq!(dso.dso_name, "/opt/chrome/chrome");
        assert_eq!(dso.offset, 0x8400);
        drop(parser);

        // One merged mmap plus the sample.
        assert_eq!(profile.events.len(), 2);
        let (start, len, pgoff, filename) = mmap_geometry(&profile.events[0]);
        assert_eq!(start, 0x40018000);
        assert_eq!(len, 0x5de8000);
        assert_eq!(pgoff, 0);
        assert_eq!(filename, "/opt/chrome/chrome");
    }

    #[test]
    fn leading_anon_mapping_is_backfilled() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.mmap_event(2345, 0x45e00000, 0x1e00000, 0, "//anon", 2345, 2346);
        file.mmap_event(
            2345,
            0x47c00000,
            0x4000000,
            0x1e00000,
            "/opt/chrome/chrome",
            2345,
            2346,
        );
        file.sample_event_ip_tid(0x45e01300, 2345, 2346);

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, no_threshold());
        parser.parse().unwrap();

        assert_eq!(parser.stats().num_mmap_events, 1);
        let dso = parser.parsed_events()[1].dso_and_offset.as_ref().unwrap();
        assert_eq!(dso.dso_name, "/opt/chrome/chrome");
        assert_eq!(dso.offset, 0x1300);
        drop(parser);

        let (start, len, pgoff, filename) = mmap_geometry(&profile.events[0]);
        assert_eq!((start, len, pgoff), (0x45e00000, 0x5e00000, 0));
        assert_eq!(filename, "/opt/chrome/chrome");
    }

    #[test]
    fn discontiguous_mappings_do_not_combine() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.mmap_event(1234, 0x7f489000, 0xd77000, 0, "file", 1234, 1234);
        file.mmap_event(1234, 0x80200000, 0x200000, 0, "file", 1234, 1234);
        file.mmap_event(1234, 0x80400000, 0x47000, 0x1a00000, "file", 1234, 1234);

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, no_threshold());
        parser.parse().unwrap();

        // The middle mapping could belong before or after; nothing merges.
        assert_eq!(parser.stats().num_mmap_events, 3);
        drop(parser);
        assert_eq!(profile.events.len(), 3);
    }

    #[test]
    fn forked_process_inherits_the_parent_space() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID | SampleFormat::TIME, true, &[]);
        file.mmap_event(100, 0x1000, 0x1000, 0, "/bin/parent", 100, 100);
        file.fork_event(200, 100, 200, 100, 1000);
        file.sample_event(0x2234, 200, 200, 2000, 0, &[]); // outside the mapping
        file.sample_event(0x1800, 200, 200, 3000, 0, &[]);

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, no_threshold());
        parser.parse().unwrap();

        assert_eq!(parser.stats().num_fork_events, 1);
        assert_eq!(parser.stats().num_sample_events_mapped, 1);
        let dso = parser.parsed_events()[3].dso_and_offset.as_ref().unwrap();
        assert_eq!(dso.dso_name, "/bin/parent");
        assert_eq!(dso.offset, 0x800);
    }

    #[test]
    fn low_mapping_ratio_fails_the_parse() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.sample_event_ip_tid(0xdead, 1, 1);

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, ParserOptions::default());
        let err = parser.parse().unwrap_err();
        assert!(matches!(err, Error::LowSampleMappingRatio { .. }));
    }

    #[test]
    fn skipped_event_types_are_removed() {
        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.mmap_event(1, 0x1000, 0x1000, 0, "/bin/a", 1, 1);
        file.context_switch_event(true, 1, 1);

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut options = no_threshold();
        options.event_types_to_skip.insert(PERF_RECORD_SWITCH);
        let mut parser = PerfParser::new(&mut profile, options);
        parser.parse().unwrap();
        drop(parser);
        assert_eq!(profile.events.len(), 1);
    }

    #[test]
    fn sample_callback_sees_resolved_samples() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut file = PipedFileBuilder::new();
        file.attr_event(SampleFormat::IP | SampleFormat::TID, true, &[]);
        file.mmap_event(1, 0x1000, 0x1000, 0, "/bin/a", 1, 1);
        file.sample_event_ip_tid(0x1004, 1, 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_callback = Rc::clone(&seen);
        let mut options = no_threshold();
        options.do_remap = true;
        options.sample_event_callback = Some(Box::new(move |sample: &SampleEvent| {
            seen_in_callback.borrow_mut().push(sample.ip.unwrap());
        }));

        let mut profile = PerfReader::read_from_slice(&file.finish()).unwrap();
        let mut parser = PerfParser::new(&mut profile, options);
        parser.parse().unwrap();
        // The callback ran after remapping rewrote the ip.
        assert_eq!(*seen.borrow(), vec![0x4]);
    }
}
