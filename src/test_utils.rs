//! Hand-rolled little-endian perf.data fixtures for unit tests.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::attr::{AttrFlags, PerfEventAttr, SampleFormat};
use crate::codec::aligned_string_len;
use crate::consts::*;
use crate::record::KERNEL_PID;

type E = LittleEndian;

/// Builds a piped-mode file byte by byte, the way perf would stream it.
pub struct PipedFileBuilder {
    data: Vec<u8>,
    sample_format: SampleFormat,
    sample_id_all: bool,
}

impl PipedFileBuilder {
    pub fn new() -> Self {
        let mut data = Vec::new();
        data.write_u64::<E>(PERF_MAGIC).unwrap();
        data.write_u64::<E>(PERF_PIPED_HEADER_SIZE).unwrap();
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
        self.data.write_u32::<E>(type_).unwrap();
        self.data.write_u16::<E>(misc).unwrap();
        self.data.write_u16::<E>(size as u16).unwrap();
    }

    pub fn attr_event(&mut self, sample_format: SampleFormat, sample_id_all: bool, ids: &[u64]) {
        let mut flags = AttrFlags::empty();
        if sample_id_all {
            flags |= AttrFlags::SAMPLE_ID_ALL;
        }
        self.attr_event_with_flags(sample_format, flags, ids);
    }

    pub fn attr_event_with_flags(
        &mut self,
        sample_format: SampleFormat,
        flags: AttrFlags,
        ids: &[u64],
    ) {
        let attr = PerfEventAttr {
            sample_format,
            flags,
            ..Default::default()
        };
        let size = PERF_EVENT_HEADER_SIZE + PERF_ATTR_SIZE_VER7 as usize + ids.len() * 8;
        self.header(PERF_RECORD_HEADER_ATTR, 0, size);
        attr.write_to(&mut self.data).unwrap();
        for id in ids {
            self.data.write_u64::<E>(*id).unwrap();
        }
        self.sample_format = sample_format;
        self.sample_id_all = flags.contains(AttrFlags::SAMPLE_ID_ALL);
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
        self.sample_format.intersection(trailer_bits).bits().count_ones() as usize * 8
    }

    fn write_trailer(&mut self, pid: u32, tid: u32, time: u64, id: u64) {
        if !self.sample_id_all {
            return;
        }
        let fmt = self.sample_format;
        if fmt.contains(SampleFormat::TID) {
            self.data.write_u32::<E>(pid).unwrap();
            self.data.write_u32::<E>(tid).unwrap();
        }
        if fmt.contains(SampleFormat::TIME) {
            self.data.write_u64::<E>(time).unwrap();
        }
        if fmt.contains(SampleFormat::ID) {
            self.data.write_u64::<E>(id).unwrap();
        }
        if fmt.contains(SampleFormat::STREAM_ID) {
            self.data.write_u64::<E>(0).unwrap();
        }
        if fmt.contains(SampleFormat::CPU) {
            self.data.write_u32::<E>(0).unwrap();
            self.data.write_u32::<E>(0).unwrap();
        }
        if fmt.contains(SampleFormat::IDENTIFIER) {
            self.data.write_u64::<E>(id).unwrap();
        }
    }

    fn write_padded_string(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
        let padding = aligned_string_len(s) - s.len();
        self.data.extend_from_slice(&vec![0u8; padding]);
    }

    pub fn mmap_event(
        &mut self,
        pid: u32,
        start: u64,
        len: u64,
        pgoff: u64,
        filename: &str,
        trailer_pid: u32,
        trailer_tid: u32,
    ) {
        self.mmap_event_with_misc(
            PERF_RECORD_MISC_USER,
            pid,
            start,
            len,
            pgoff,
            filename,
            trailer_pid,
            trailer_tid,
        );
    }

    pub fn kernel_mmap_event(&mut self, start: u64, len: u64, pgoff: u64, filename: &str) {
        self.mmap_event_with_misc(
            PERF_RECORD_MISC_KERNEL,
            KERNEL_PID,
            start,
            len,
            pgoff,
            filename,
            KERNEL_PID,
            0,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mmap_event_with_misc(
        &mut self,
        misc: u16,
        pid: u32,
        start: u64,
        len: u64,
        pgoff: u64,
        filename: &str,
        trailer_pid: u32,
        trailer_tid: u32,
    ) {
        let size =
            PERF_EVENT_HEADER_SIZE + 32 + aligned_string_len(filename) + self.trailer_len();
        self.header(PERF_RECORD_MMAP, misc, size);
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u64::<E>(start).unwrap();
        self.data.write_u64::<E>(len).unwrap();
        self.data.write_u64::<E>(pgoff).unwrap();
        self.write_padded_string(filename);
        self.write_trailer(trailer_pid, trailer_tid, 0, 0);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mmap2_event(
        &mut self,
        pid: u32,
        start: u64,
        len: u64,
        pgoff: u64,
        filename: &str,
        maj: u32,
        min: u32,
        ino: u64,
    ) {
        let size =
            PERF_EVENT_HEADER_SIZE + 64 + aligned_string_len(filename) + self.trailer_len();
        self.header(PERF_RECORD_MMAP2, PERF_RECORD_MISC_USER, size);
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u64::<E>(start).unwrap();
        self.data.write_u64::<E>(len).unwrap();
        self.data.write_u64::<E>(pgoff).unwrap();
        self.data.write_u32::<E>(maj).unwrap();
        self.data.write_u32::<E>(min).unwrap();
        self.data.write_u64::<E>(ino).unwrap();
        self.data.write_u64::<E>(0).unwrap(); // ino_generation
        self.data.write_u32::<E>(5).unwrap(); // prot
        self.data.write_u32::<E>(2).unwrap(); // flags
        self.write_padded_string(filename);
        self.write_trailer(pid, pid, 0, 0);
    }

    pub fn mmap2_event_with_build_id(
        &mut self,
        pid: u32,
        start: u64,
        len: u64,
        pgoff: u64,
        filename: &str,
        build_id: &[u8],
    ) {
        let size =
            PERF_EVENT_HEADER_SIZE + 64 + aligned_string_len(filename) + self.trailer_len();
        self.header(
            PERF_RECORD_MMAP2,
            PERF_RECORD_MISC_USER | PERF_RECORD_MISC_MMAP_BUILD_ID,
            size,
        );
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u64::<E>(start).unwrap();
        self.data.write_u64::<E>(len).unwrap();
        self.data.write_u64::<E>(pgoff).unwrap();
        self.data.write_u8(build_id.len() as u8).unwrap();
        self.data.write_u8(0).unwrap();
        self.data.write_u16::<E>(0).unwrap();
        let mut padded = [0u8; BUILD_ID_SIZE];
        padded[..build_id.len()].copy_from_slice(build_id);
        self.data.extend_from_slice(&padded);
        self.data.write_u32::<E>(5).unwrap();
        self.data.write_u32::<E>(2).unwrap();
        self.write_padded_string(filename);
        self.write_trailer(pid, pid, 0, 0);
    }

    pub fn sample_event_ip_tid(&mut self, ip: u64, pid: u32, tid: u32) {
        self.sample_event(ip, pid, tid, 0, 0, &[]);
    }

    /// A SAMPLE event covering the subset of fields the unit fixtures use.
    pub fn sample_event(
        &mut self,
        ip: u64,
        pid: u32,
        tid: u32,
        time: u64,
        addr: u64,
        branch_stack: &[(u64, u64, u64)],
    ) {
        let fmt = self.sample_format;
        let mut payload = Vec::new();
        if fmt.contains(SampleFormat::IDENTIFIER) {
            payload.write_u64::<E>(0).unwrap();
        }
        if fmt.contains(SampleFormat::IP) {
            payload.write_u64::<E>(ip).unwrap();
        }
        if fmt.contains(SampleFormat::TID) {
            payload.write_u32::<E>(pid).unwrap();
            payload.write_u32::<E>(tid).unwrap();
        }
        if fmt.contains(SampleFormat::TIME) {
            payload.write_u64::<E>(time).unwrap();
        }
        if fmt.contains(SampleFormat::ADDR) {
            payload.write_u64::<E>(addr).unwrap();
        }
        if fmt.contains(SampleFormat::ID) {
            payload.write_u64::<E>(0).unwrap();
        }
        if fmt.contains(SampleFormat::BRANCH_STACK) {
            payload.write_u64::<E>(branch_stack.len() as u64).unwrap();
            for (from, to, flags) in branch_stack {
                payload.write_u64::<E>(*from).unwrap();
                payload.write_u64::<E>(*to).unwrap();
                payload.write_u64::<E>(*flags).unwrap();
            }
        }
        let size = PERF_EVENT_HEADER_SIZE + payload.len();
        self.header(PERF_RECORD_SAMPLE, PERF_RECORD_MISC_USER, size);
        self.data.extend_from_slice(&payload);
    }

    pub fn context_switch_event(&mut self, is_out: bool, pid: u32, tid: u32) {
        let misc = if is_out { PERF_RECORD_MISC_SWITCH_OUT } else { 0 };
        let size = PERF_EVENT_HEADER_SIZE + self.trailer_len();
        self.header(PERF_RECORD_SWITCH, misc, size);
        self.write_trailer(pid, tid, 0, 0);
    }

    pub fn context_switch_cpu_wide_event(
        &mut self,
        is_out: bool,
        next_prev_pid: u32,
        next_prev_tid: u32,
        pid: u32,
        tid: u32,
    ) {
        let misc = if is_out { PERF_RECORD_MISC_SWITCH_OUT } else { 0 };
        let size = PERF_EVENT_HEADER_SIZE + 8 + self.trailer_len();
        self.header(PERF_RECORD_SWITCH_CPU_WIDE, misc, size);
        self.data.write_u32::<E>(next_prev_pid).unwrap();
        self.data.write_u32::<E>(next_prev_tid).unwrap();
        self.write_trailer(pid, tid, 0, 0);
    }

    pub fn fork_event(&mut self, pid: u32, ppid: u32, tid: u32, ptid: u32, time: u64) {
        let size = PERF_EVENT_HEADER_SIZE + 24 + self.trailer_len();
        self.header(PERF_RECORD_FORK, 0, size);
        self.data.write_u32::<E>(pid).unwrap();
        self.data.write_u32::<E>(ppid).unwrap();
        self.data.write_u32::<E>(tid).unwrap();
        self.data.write_u32::<E>(ptid).unwrap();
        self.data.write_u64::<E>(time).unwrap();
        self.write_trailer(pid, tid, time, 0);
    }

    pub fn raw_event(&mut self, type_: u32, misc: u16, body: &[u8]) {
        self.header(type_, misc, PERF_EVENT_HEADER_SIZE + body.len());
        self.data.extend_from_slice(body);
    }

    pub fn feature_event(&mut self, feat_id: u32, body: &[u8]) {
        let size = PERF_EVENT_HEADER_SIZE + 8 + body.len();
        self.header(PERF_RECORD_HEADER_FEATURE, 0, size);
        self.data.write_u64::<E>(feat_id as u64).unwrap();
        self.data.extend_from_slice(body);
    }

    pub fn tracing_data_event(&mut self, tracing_data: &[u8]) {
        // The record's size covers only the header and the length word; the
        // tracing bytes follow the record.
        self.header(
            PERF_RECORD_HEADER_TRACING_DATA,
            0,
            PERF_EVENT_HEADER_SIZE + 4,
        );
        self.data.write_u32::<E>(tracing_data.len() as u32).unwrap();
        self.data.extend_from_slice(tracing_data);
    }
}
