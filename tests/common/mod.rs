//! Shared fixtures: a raw little-endian piped-file builder and helpers for
//! constructing profile records directly.

use perf_profile::attr::{AttrFlags, PerfEventAttr, PerfFileAttr, SampleFormat};
use perf_profile::codec;
use perf_profile::consts::*;
use perf_profile::record::{EventData, EventHeader, EventRecord, SampleInfo};
use perf_profile::sample_info::SampleInfoRegistry;

/// Builds a piped-mode perf.data byte stream the way perf would emit it.
pub struct PipedFileBuilder {
    data: Vec<u8>,
    sample_format: SampleFormat,
    sample_id_all: bool,
}

impl PipedFileBuilder {
    pub fn new() -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&PERF_MAGIC.to_le_bytes());
        data.extend_from_slice(&PERF_PIPED_HEADER_SIZE.to_le_bytes());
        Self {
            data,
            sample_format: SampleFormat::empty(),
            sample_id_all: false,
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }

    fn header(&mut self, type_: u32, misc: u16, size: usize) {
        self.data.extend_from_slice(&type_.to_le_bytes());
        self.data.extend_from_slice(&misc.to_le_bytes());
        self.data.extend_from_slice(&(size as u16).to_le_bytes());
    }

    pub fn attr_event(&mut self, sample_format: SampleFormat, sample_id_all: bool, ids: &[u64]) {
        let mut flags = AttrFlags::empty();
        if sample_id_all {
            flags |= AttrFlags::SAMPLE_ID_ALL;
        }
        let attr = PerfEventAttr {
            sample_format,
            flags,
            ..Default::default()
        };
        let size = PERF_EVENT_HEADER_SIZE + PERF_ATTR_SIZE_VER7 as usize + ids.len() * 8;
        self.header(PERF_RECORD_HEADER_ATTR, 0, size);
        attr.write_to(&mut self.data).unwrap();
        for id in ids {
            self.data.extend_from_slice(&id.to_le_bytes());
        }
        self.sample_format = sample_format;
        self.sample_id_all = sample_id_all;
    }

    fn trailer_len(&self) -> usize {
        if !self.sample_id_all {
            return 0;
        }
        let trailer_bits = SampleFormat::TID
            | SampleFormat::TIME
            | SampleFormat::ID
            | SampleFormat::STREAM_ID
            | SampleFormat::CPU
            | SampleFormat::IDENTIFIER;
        self.sample_format
            .intersection(trailer_bits)
            .bits()
            .count_ones() as usize
            * 8
    }

    fn write_trailer(&mut self, pid: u32, tid: u32, time: u64) {
        if !self.sample_id_all {
            return;
        }
        let fmt = self.sample_format;
        if fmt.contains(SampleFormat::TID) {
            self.data.extend_from_slice(&pid.to_le_bytes());
            self.data.extend_from_slice(&tid.to_le_bytes());
        }
        if fmt.contains(SampleFormat::TIME) {
            self.data.extend_from_slice(&time.to_le_bytes());
        }
        if fmt.contains(SampleFormat::ID) {
            self.data.extend_from_slice(&0u64.to_le_bytes());
        }
        if fmt.contains(SampleFormat::STREAM_ID) {
            self.data.extend_from_slice(&0u64.to_le_bytes());
        }
        if fmt.contains(SampleFormat::CPU) {
            self.data.extend_from_slice(&0u64.to_le_bytes());
        }
        if fmt.contains(SampleFormat::IDENTIFIER) {
            self.data.extend_from_slice(&0u64.to_le_bytes());
        }
    }

    pub fn context_switch_event(&mut self, is_out: bool, pid: u32, tid: u32, time: u64) {
        let misc = if is_out { PERF_RECORD_MISC_SWITCH_OUT } else { 0 };
        let size = PERF_EVENT_HEADER_SIZE + self.trailer_len();
        self.header(PERF_RECORD_SWITCH, misc, size);
        self.write_trailer(pid, tid, time);
    }

    pub fn context_switch_cpu_wide_event(
        &mut self,
        is_out: bool,
        next_prev_pid: u32,
        next_prev_tid: u32,
        pid: u32,
        tid: u32,
        time: u64,
    ) {
        let misc = if is_out { PERF_RECORD_MISC_SWITCH_OUT } else { 0 };
        let size = PERF_EVENT_HEADER_SIZE + 8 + self.trailer_len();
        self.header(PERF_RECORD_SWITCH_CPU_WIDE, misc, size);
        self.data.extend_from_slice(&next_prev_pid.to_le_bytes());
        self.data.extend_from_slice(&next_prev_tid.to_le_bytes());
        self.write_trailer(pid, tid, time);
    }
}

/// An attribute for one hardware counter with the given sample selection.
pub fn hardware_attr(sample_format: SampleFormat, ids: Vec<u64>) -> PerfFileAttr {
    PerfFileAttr {
        attr: PerfEventAttr {
            type_: 0, // PERF_TYPE_HARDWARE
            config: 0,
            sampling_period_or_frequency: 100_000,
            sample_format,
            flags: AttrFlags::SAMPLE_ID_ALL,
            ..Default::default()
        },
        ids,
        name: None,
    }
}

/// Wraps a payload into a record with a correctly sized header.
pub fn record(
    type_: u32,
    misc: u16,
    data: EventData,
    sample_info: Option<SampleInfo>,
    registry: &SampleInfoRegistry,
) -> EventRecord {
    let mut record = EventRecord {
        header: EventHeader {
            type_,
            misc,
            size: 0,
        },
        data,
        sample_info,
    };
    record.header.size = codec::event_size(&record, registry).unwrap() as u16;
    record
}
