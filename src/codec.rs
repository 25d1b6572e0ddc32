//! Per-record-kind translation between raw bytes and [`EventRecord`].
//!
//! Each record is an 8-byte header, a fixed payload whose size depends only
//! on the record type, a variable payload sized by the header and by counts
//! inside the fixed payload, and (for kernel records under `sample_id_all`)
//! the sample-info trailer handled by [`crate::sample_info`].

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::consts::*;
use crate::error::{Error, Result};
use crate::record::*;
use crate::sample_info::SampleInfoRegistry;

pub fn is_supported_kernel_type(type_: u32) -> bool {
    matches!(
        type_,
        PERF_RECORD_MMAP
            | PERF_RECORD_LOST
            | PERF_RECORD_COMM
            | PERF_RECORD_EXIT
            | PERF_RECORD_THROTTLE
            | PERF_RECORD_UNTHROTTLE
            | PERF_RECORD_FORK
            | PERF_RECORD_SAMPLE
            | PERF_RECORD_MMAP2
            | PERF_RECORD_AUX
            | PERF_RECORD_ITRACE_START
            | PERF_RECORD_LOST_SAMPLES
            | PERF_RECORD_SWITCH
            | PERF_RECORD_SWITCH_CPU_WIDE
            | PERF_RECORD_NAMESPACES
            | PERF_RECORD_CGROUP
    )
}

pub fn is_supported_user_type(type_: u32) -> bool {
    matches!(
        type_,
        PERF_RECORD_FINISHED_ROUND
            | PERF_RECORD_AUXTRACE_INFO
            | PERF_RECORD_AUXTRACE
            | PERF_RECORD_AUXTRACE_ERROR
            | PERF_RECORD_THREAD_MAP
            | PERF_RECORD_STAT_CONFIG
            | PERF_RECORD_STAT
            | PERF_RECORD_STAT_ROUND
            | PERF_RECORD_TIME_CONV
    )
}

pub fn is_supported_header_type(type_: u32) -> bool {
    matches!(
        type_,
        PERF_RECORD_HEADER_ATTR
            | PERF_RECORD_HEADER_EVENT_TYPE
            | PERF_RECORD_HEADER_TRACING_DATA
            | PERF_RECORD_HEADER_BUILD_ID
            | PERF_RECORD_HEADER_FEATURE
    )
}

/// Whether records of this type end in a sample-info trailer (or, for
/// SAMPLE, consist of one). Non-SAMPLE records only carry the trailer when
/// the attributes were configured with `sample_id_all`.
pub fn contains_sample_info(type_: u32, registry: &SampleInfoRegistry) -> bool {
    if type_ == PERF_RECORD_SAMPLE {
        return true;
    }
    is_supported_kernel_type(type_) && !registry.is_empty() && registry.sample_id_all()
}

pub fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Storage a NUL-terminated string occupies on disk: the string, its
/// terminator, and zero padding up to u64 alignment.
pub fn aligned_string_len(s: &str) -> usize {
    align8(s.len() + 1)
}

/// Reads a NUL-terminated string out of a u64-padded field and returns it
/// together with the number of bytes the field occupies.
fn read_aligned_string(data: &[u8]) -> Result<(String, usize)> {
    let strlen = memchr::memchr(0, data)
        .ok_or_else(|| Error::format("string field is missing its NUL terminator"))?;
    let s = String::from_utf8_lossy(&data[..strlen]).into_owned();
    Ok((s, align8(strlen + 1).min(data.len())))
}

fn write_aligned_string<W: Write>(s: &str, writer: &mut W) -> Result<()> {
    writer.write_all(s.as_bytes())?;
    let padding = aligned_string_len(s) - s.len();
    writer.write_all(&vec![0u8; padding])?;
    Ok(())
}

/// Size of the fixed payload of a record type, including the 8-byte header.
/// Returns `None` for unsupported types.
pub fn fixed_payload_size(type_: u32) -> Option<usize> {
    let body = match type_ {
        PERF_RECORD_SAMPLE => 0,
        PERF_RECORD_MMAP => 8 + 24,
        PERF_RECORD_MMAP2 => 8 + 24 + 24 + 8,
        PERF_RECORD_COMM => 8,
        PERF_RECORD_EXIT | PERF_RECORD_FORK => 24,
        PERF_RECORD_LOST => 16,
        PERF_RECORD_THROTTLE | PERF_RECORD_UNTHROTTLE => 24,
        PERF_RECORD_AUX => 24,
        PERF_RECORD_ITRACE_START => 8,
        PERF_RECORD_LOST_SAMPLES => 8,
        PERF_RECORD_SWITCH => 0,
        PERF_RECORD_SWITCH_CPU_WIDE => 8,
        PERF_RECORD_NAMESPACES => 8 + 8,
        PERF_RECORD_CGROUP => 8,
        PERF_RECORD_FINISHED_ROUND => 0,
        PERF_RECORD_AUXTRACE_INFO => 8,
        PERF_RECORD_AUXTRACE => 40,
        PERF_RECORD_AUXTRACE_ERROR => 32,
        PERF_RECORD_THREAD_MAP => 8,
        PERF_RECORD_STAT_CONFIG => 8,
        PERF_RECORD_STAT => 40,
        PERF_RECORD_STAT_ROUND => 16,
        PERF_RECORD_TIME_CONV => 24,
        _ => return None,
    };
    Some(PERF_EVENT_HEADER_SIZE + body)
}

/// Parses the body of one record (everything after the 8-byte header) into
/// its structured form, transcoding the sample-info trailer through the
/// registry.
pub fn parse_event<T: ByteOrder>(
    header: EventHeader,
    body: &[u8],
    registry: &SampleInfoRegistry,
) -> Result<EventRecord> {
    let type_ = header.type_;
    let fixed = fixed_payload_size(type_)
        .ok_or_else(|| Error::format(format!("unsupported event {}", event_name(type_))))?;
    if (header.size as usize) < fixed {
        return Err(Error::format(format!(
            "event size {} of {} is less than its fixed payload size {fixed}",
            header.size,
            event_name(type_)
        )));
    }

    if type_ == PERF_RECORD_SAMPLE {
        let id = registry.event_id_from_sample::<T>(body)?;
        let reader = registry
            .reader_for_id(id)
            .ok_or(Error::NoReaderForId(id))?;
        let sample = reader.parse_sample::<T>(body)?;
        return Ok(EventRecord {
            header,
            data: EventData::Sample(sample),
            sample_info: None,
        });
    }

    let mut cur = body;
    let data = match type_ {
        PERF_RECORD_MMAP => {
            let pid = cur.read_u32::<T>()?;
            let tid = cur.read_u32::<T>()?;
            let start = cur.read_u64::<T>()?;
            let len = cur.read_u64::<T>()?;
            let pgoff = cur.read_u64::<T>()?;
            let (filename, consumed) = read_aligned_string(cur)?;
            cur = &cur[consumed..];
            EventData::Mmap(MmapEvent {
                pid,
                tid,
                start,
                len,
                pgoff,
                filename,
            })
        }
        PERF_RECORD_MMAP2 => {
            let pid = cur.read_u32::<T>()?;
            let tid = cur.read_u32::<T>()?;
            let start = cur.read_u64::<T>()?;
            let len = cur.read_u64::<T>()?;
            let pgoff = cur.read_u64::<T>()?;
            let file_id = if header.misc & PERF_RECORD_MISC_MMAP_BUILD_ID != 0 {
                let build_id_size = cur.read_u8()? as usize;
                let _resv1 = cur.read_u8()?;
                let _resv2 = cur.read_u16::<T>()?;
                let mut build_id = [0u8; BUILD_ID_SIZE];
                std::io::Read::read_exact(&mut cur, &mut build_id)?;
                if build_id_size > BUILD_ID_SIZE {
                    return Err(Error::BuildIdTooLong(build_id_size));
                }
                Mmap2FileId::BuildId(build_id[..build_id_size].to_vec())
            } else {
                Mmap2FileId::InodeAndVersion {
                    maj: cur.read_u32::<T>()?,
                    min: cur.read_u32::<T>()?,
                    ino: cur.read_u64::<T>()?,
                    ino_generation: cur.read_u64::<T>()?,
                }
            };
            let prot = cur.read_u32::<T>()?;
            let flags = cur.read_u32::<T>()?;
            let (filename, consumed) = read_aligned_string(cur)?;
            cur = &cur[consumed..];
            EventData::Mmap2(Mmap2Event {
                pid,
                tid,
                start,
                len,
                pgoff,
                file_id,
                prot,
                flags,
                filename,
            })
        }
        PERF_RECORD_COMM => {
            let pid = cur.read_u32::<T>()?;
            let tid = cur.read_u32::<T>()?;
            let (comm, consumed) = read_aligned_string(cur)?;
            cur = &cur[consumed..];
            EventData::Comm(CommEvent { pid, tid, comm })
        }
        PERF_RECORD_EXIT | PERF_RECORD_FORK => {
            let event = ForkEvent {
                pid: cur.read_u32::<T>()?,
                ppid: cur.read_u32::<T>()?,
                tid: cur.read_u32::<T>()?,
                ptid: cur.read_u32::<T>()?,
                time: cur.read_u64::<T>()?,
            };
            if type_ == PERF_RECORD_EXIT {
                EventData::Exit(event)
            } else {
                EventData::Fork(event)
            }
        }
        PERF_RECORD_LOST => EventData::Lost(LostEvent {
            id: cur.read_u64::<T>()?,
            lost: cur.read_u64::<T>()?,
        }),
        PERF_RECORD_THROTTLE | PERF_RECORD_UNTHROTTLE => {
            let event = ThrottleEvent {
                time: cur.read_u64::<T>()?,
                id: cur.read_u64::<T>()?,
                stream_id: cur.read_u64::<T>()?,
            };
            if type_ == PERF_RECORD_THROTTLE {
                EventData::Throttle(event)
            } else {
                EventData::Unthrottle(event)
            }
        }
        PERF_RECORD_AUX => EventData::Aux(AuxEvent {
            aux_offset: cur.read_u64::<T>()?,
            aux_size: cur.read_u64::<T>()?,
            flags: cur.read_u64::<T>()?,
        }),
        PERF_RECORD_ITRACE_START => EventData::ItraceStart(ItraceStartEvent {
            pid: cur.read_u32::<T>()?,
            tid: cur.read_u32::<T>()?,
        }),
        PERF_RECORD_LOST_SAMPLES => EventData::LostSamples(LostSamplesEvent {
            lost: cur.read_u64::<T>()?,
        }),
        PERF_RECORD_SWITCH => EventData::ContextSwitch(ContextSwitchEvent {
            next_prev_pid: None,
            next_prev_tid: None,
        }),
        PERF_RECORD_SWITCH_CPU_WIDE => EventData::ContextSwitch(ContextSwitchEvent {
            next_prev_pid: Some(cur.read_u32::<T>()?),
            next_prev_tid: Some(cur.read_u32::<T>()?),
        }),
        PERF_RECORD_NAMESPACES => {
            let pid = cur.read_u32::<T>()?;
            let tid = cur.read_u32::<T>()?;
            let nr = cur.read_u64::<T>()? as usize;
            if nr * 16 > cur.len() {
                return Err(Error::Truncation {
                    what: "namespaces link info",
                    declared: (nr * 16) as u64,
                    remaining: cur.len() as u64,
                });
            }
            let mut link_info = Vec::with_capacity(nr);
            for _ in 0..nr {
                link_info.push(NsLinkInfo {
                    dev: cur.read_u64::<T>()?,
                    ino: cur.read_u64::<T>()?,
                });
            }
            EventData::Namespaces(NamespacesEvent {
                pid,
                tid,
                link_info,
            })
        }
        PERF_RECORD_CGROUP => {
            let id = cur.read_u64::<T>()?;
            let (path, consumed) = read_aligned_string(cur)?;
            cur = &cur[consumed..];
            EventData::Cgroup(CgroupEvent { id, path })
        }
        PERF_RECORD_FINISHED_ROUND => EventData::FinishedRound,
        PERF_RECORD_AUXTRACE_INFO => {
            let info_type = cur.read_u32::<T>()?;
            let reserved = cur.read_u32::<T>()?;
            if reserved != 0 {
                log::warn!(
                    "AUXTRACE_INFO reserved field contains nonzero value {reserved}; \
                     this record's format has changed"
                );
            }
            let nr = cur.len() / 8;
            let mut priv_data = Vec::with_capacity(nr);
            for _ in 0..nr {
                priv_data.push(cur.read_u64::<T>()?);
            }
            EventData::AuxtraceInfo(AuxtraceInfoEvent {
                type_: info_type,
                priv_data,
            })
        }
        PERF_RECORD_AUXTRACE => {
            let size = cur.read_u64::<T>()?;
            let offset = cur.read_u64::<T>()?;
            let reference = cur.read_u64::<T>()?;
            let idx = cur.read_u32::<T>()?;
            let tid = cur.read_u32::<T>()?;
            let cpu = cur.read_u32::<T>()?;
            let _reserved = cur.read_u32::<T>()?;
            // The trace bytes follow the record in the stream; the reader
            // appends them once it has consumed the record.
            EventData::Auxtrace(AuxtraceEvent {
                size,
                offset,
                reference,
                idx,
                tid,
                cpu,
                trace_data: Vec::new(),
            })
        }
        PERF_RECORD_AUXTRACE_ERROR => {
            let err_type = cur.read_u32::<T>()?;
            let code = cur.read_u32::<T>()?;
            let cpu = cur.read_u32::<T>()?;
            let pid = cur.read_u32::<T>()?;
            let tid = cur.read_u32::<T>()?;
            let reserved = cur.read_u32::<T>()?;
            if reserved != 0 {
                log::warn!(
                    "AUXTRACE_ERROR reserved field contains nonzero value {reserved}; \
                     this record's format has changed"
                );
            }
            let ip = cur.read_u64::<T>()?;
            let msg_len = memchr::memchr(0, cur).unwrap_or(cur.len());
            let msg = String::from_utf8_lossy(&cur[..msg_len]).into_owned();
            cur = &cur[cur.len()..];
            EventData::AuxtraceError(AuxtraceErrorEvent {
                type_: err_type,
                code,
                cpu,
                pid,
                tid,
                ip,
                msg,
            })
        }
        PERF_RECORD_THREAD_MAP => {
            let nr = cur.read_u64::<T>()? as usize;
            if nr * (8 + THREAD_COMM_LEN) > cur.len() {
                return Err(Error::Truncation {
                    what: "thread map entries",
                    declared: (nr * (8 + THREAD_COMM_LEN)) as u64,
                    remaining: cur.len() as u64,
                });
            }
            let mut entries = Vec::with_capacity(nr);
            for _ in 0..nr {
                let pid = cur.read_u64::<T>()?;
                let mut comm_bytes = [0u8; THREAD_COMM_LEN];
                std::io::Read::read_exact(&mut cur, &mut comm_bytes)?;
                let comm_len = memchr::memchr(0, &comm_bytes).unwrap_or(THREAD_COMM_LEN);
                entries.push(ThreadMapEntry {
                    pid,
                    comm: String::from_utf8_lossy(&comm_bytes[..comm_len]).into_owned(),
                });
            }
            EventData::ThreadMap(ThreadMapEvent { entries })
        }
        PERF_RECORD_STAT_CONFIG => {
            let nr = cur.read_u64::<T>()? as usize;
            if nr * 16 > cur.len() {
                return Err(Error::Truncation {
                    what: "stat config entries",
                    declared: (nr * 16) as u64,
                    remaining: cur.len() as u64,
                });
            }
            let mut data = Vec::with_capacity(nr);
            for _ in 0..nr {
                data.push(StatConfigEntry {
                    tag: cur.read_u64::<T>()?,
                    val: cur.read_u64::<T>()?,
                });
            }
            EventData::StatConfig(StatConfigEvent { data })
        }
        PERF_RECORD_STAT => EventData::Stat(StatEvent {
            id: cur.read_u64::<T>()?,
            cpu: cur.read_u32::<T>()?,
            thread: cur.read_u32::<T>()?,
            value: cur.read_u64::<T>()?,
            enabled: cur.read_u64::<T>()?,
            running: cur.read_u64::<T>()?,
        }),
        PERF_RECORD_STAT_ROUND => EventData::StatRound(StatRoundEvent {
            type_: cur.read_u64::<T>()?,
            time: cur.read_u64::<T>()?,
        }),
        PERF_RECORD_TIME_CONV => {
            let time_shift = cur.read_u64::<T>()?;
            let time_mult = cur.read_u64::<T>()?;
            let time_zero = cur.read_u64::<T>()?;
            let mut event = TimeConvEvent {
                time_shift,
                time_mult,
                time_zero,
                ..Default::default()
            };
            // The large variant added in kernel 5.10.
            if !cur.is_empty() {
                event.time_cycles = Some(cur.read_u64::<T>()?);
                event.time_mask = Some(cur.read_u64::<T>()?);
                event.cap_user_time_zero = Some(cur.read_u8()? != 0);
                event.cap_user_time_short = Some(cur.read_u8()? != 0);
                let mut reserved = [0u8; 6];
                std::io::Read::read_exact(&mut cur, &mut reserved)?;
            }
            EventData::TimeConv(event)
        }
        _ => {
            return Err(Error::format(format!(
                "unsupported event {}",
                event_name(type_)
            )))
        }
    };

    let mut record = EventRecord {
        header,
        data,
        sample_info: None,
    };

    if contains_sample_info(type_, registry) {
        let id = registry.event_id_from_trailer::<T>(cur)?;
        let reader = registry
            .reader_for_id(id)
            .ok_or(Error::NoReaderForId(id))?;
        record.sample_info = Some(reader.parse_trailer::<T>(cur)?);
    } else if !cur.is_empty() && !record.header.is_user_type() {
        return Err(Error::format(format!(
            "event {} has {} unexpected trailing bytes",
            event_name(type_),
            cur.len()
        )));
    }

    Ok(record)
}

/// Size of the record on disk excluding any sample-info portion: the header
/// plus the fixed and variable payloads.
pub fn event_data_size(record: &EventRecord) -> usize {
    let h = PERF_EVENT_HEADER_SIZE;
    match &record.data {
        EventData::Sample(_) => h,
        EventData::Mmap(m) => h + 24 + 8 + aligned_string_len(&m.filename),
        EventData::Mmap2(m) => h + 24 + 8 + 24 + 8 + aligned_string_len(&m.filename),
        EventData::Comm(c) => h + 8 + aligned_string_len(&c.comm),
        EventData::Exit(_) | EventData::Fork(_) => h + 24,
        EventData::Lost(_) => h + 16,
        EventData::Throttle(_) | EventData::Unthrottle(_) => h + 24,
        EventData::Aux(_) => h + 24,
        EventData::ItraceStart(_) => h + 8,
        EventData::LostSamples(_) => h + 8,
        EventData::ContextSwitch(cs) => {
            if cs.next_prev_pid.is_some() {
                h + 8
            } else {
                h
            }
        }
        EventData::Namespaces(ns) => h + 16 + 16 * ns.link_info.len(),
        EventData::Cgroup(c) => h + 8 + aligned_string_len(&c.path),
        EventData::FinishedRound => h,
        EventData::AuxtraceInfo(info) => h + 8 + 8 * info.priv_data.len(),
        EventData::Auxtrace(_) => h + 40,
        EventData::AuxtraceError(_) => {
            // The message region is bounded by the record size when one is
            // recorded, and the full 64-byte field otherwise.
            let msg_space = if record.header.size as usize >= h + 32 {
                record.header.size as usize - h - 32
            } else {
                64
            };
            h + 32 + msg_space
        }
        EventData::ThreadMap(tm) => h + 8 + (8 + THREAD_COMM_LEN) * tm.entries.len(),
        EventData::StatConfig(sc) => h + 8 + 16 * sc.data.len(),
        EventData::Stat(_) => h + 40,
        EventData::StatRound(_) => h + 16,
        EventData::TimeConv(tc) => {
            if tc.is_large() {
                h + 48
            } else {
                h + 24
            }
        }
    }
}

/// The full on-disk size of the record: header, payloads, and sample info.
/// This must equal exactly what [`write_event`] emits for the record (minus
/// AUXTRACE trace bytes, which follow the record).
pub fn event_size(record: &EventRecord, registry: &SampleInfoRegistry) -> Result<usize> {
    let data_size = event_data_size(record);
    if !contains_sample_info(record.header.type_, registry) {
        return Ok(data_size);
    }
    let id = record.event_id().unwrap_or(0);
    let reader = registry.reader_for_id(id).ok_or(Error::NoReaderForId(id))?;
    let sample_size = match &record.data {
        EventData::Sample(sample) => reader.sample_payload_size(sample),
        _ => reader.trailer_size(),
    };
    Ok(data_size + sample_size)
}

/// Emits one record, little-endian, including its sample-info portion and,
/// for AUXTRACE, the trailing trace bytes. The written `header.size` is the
/// recomputed exact size; a stored size that disagrees is an error except
/// for COMM records (whose strings may legitimately have been rewritten) and
/// records with no recorded size.
pub fn write_event<W: Write>(
    record: &EventRecord,
    registry: &SampleInfoRegistry,
    writer: &mut W,
) -> Result<()> {
    type E = LittleEndian;
    let expected_size = event_size(record, registry)?;
    let stored_size = record.header.size as usize;
    if stored_size != expected_size
        && stored_size != 0
        && record.header.type_ != PERF_RECORD_COMM
    {
        return Err(Error::format(format!(
            "expected exact event size {expected_size} for event {}, got {stored_size}",
            event_name(record.header.type_)
        )));
    }

    writer.write_u32::<E>(record.header.type_)?;
    writer.write_u16::<E>(record.header.misc)?;
    writer.write_u16::<E>(expected_size as u16)?;

    match &record.data {
        EventData::Sample(sample) => {
            let id = sample.id.unwrap_or(0);
            let reader = registry.reader_for_id(id).ok_or(Error::NoReaderForId(id))?;
            reader.write_sample(sample, writer)?;
        }
        EventData::Mmap(m) => {
            writer.write_u32::<E>(m.pid)?;
            writer.write_u32::<E>(m.tid)?;
            writer.write_u64::<E>(m.start)?;
            writer.write_u64::<E>(m.len)?;
            writer.write_u64::<E>(m.pgoff)?;
            write_aligned_string(&m.filename, writer)?;
        }
        EventData::Mmap2(m) => {
            writer.write_u32::<E>(m.pid)?;
            writer.write_u32::<E>(m.tid)?;
            writer.write_u64::<E>(m.start)?;
            writer.write_u64::<E>(m.len)?;
            writer.write_u64::<E>(m.pgoff)?;
            match &m.file_id {
                Mmap2FileId::InodeAndVersion {
                    maj,
                    min,
                    ino,
                    ino_generation,
                } => {
                    writer.write_u32::<E>(*maj)?;
                    writer.write_u32::<E>(*min)?;
                    writer.write_u64::<E>(*ino)?;
                    writer.write_u64::<E>(*ino_generation)?;
                }
                Mmap2FileId::BuildId(build_id) => {
                    if build_id.len() > BUILD_ID_SIZE {
                        return Err(Error::BuildIdTooLong(build_id.len()));
                    }
                    writer.write_u8(build_id.len() as u8)?;
                    writer.write_u8(0)?;
                    writer.write_u16::<E>(0)?;
                    let mut padded = [0u8; BUILD_ID_SIZE];
                    padded[..build_id.len()].copy_from_slice(build_id);
                    writer.write_all(&padded)?;
                }
            }
            writer.write_u32::<E>(m.prot)?;
            writer.write_u32::<E>(m.flags)?;
            write_aligned_string(&m.filename, writer)?;
        }
        EventData::Comm(c) => {
            writer.write_u32::<E>(c.pid)?;
            writer.write_u32::<E>(c.tid)?;
            write_aligned_string(&c.comm, writer)?;
        }
        EventData::Exit(f) | EventData::Fork(f) => {
            writer.write_u32::<E>(f.pid)?;
            writer.write_u32::<E>(f.ppid)?;
            writer.write_u32::<E>(f.tid)?;
            writer.write_u32::<E>(f.ptid)?;
            writer.write_u64::<E>(f.time)?;
        }
        EventData::Lost(l) => {
            writer.write_u64::<E>(l.id)?;
            writer.write_u64::<E>(l.lost)?;
        }
        EventData::Throttle(t) | EventData::Unthrottle(t) => {
            writer.write_u64::<E>(t.time)?;
            writer.write_u64::<E>(t.id)?;
            writer.write_u64::<E>(t.stream_id)?;
        }
        EventData::Aux(a) => {
            writer.write_u64::<E>(a.aux_offset)?;
            writer.write_u64::<E>(a.aux_size)?;
            writer.write_u64::<E>(a.flags)?;
        }
        EventData::ItraceStart(i) => {
            writer.write_u32::<E>(i.pid)?;
            writer.write_u32::<E>(i.tid)?;
        }
        EventData::LostSamples(l) => {
            writer.write_u64::<E>(l.lost)?;
        }
        EventData::ContextSwitch(cs) => {
            if let (Some(pid), Some(tid)) = (cs.next_prev_pid, cs.next_prev_tid) {
                writer.write_u32::<E>(pid)?;
                writer.write_u32::<E>(tid)?;
            }
        }
        EventData::Namespaces(ns) => {
            writer.write_u32::<E>(ns.pid)?;
            writer.write_u32::<E>(ns.tid)?;
            writer.write_u64::<E>(ns.link_info.len() as u64)?;
            for link in &ns.link_info {
                writer.write_u64::<E>(link.dev)?;
                writer.write_u64::<E>(link.ino)?;
            }
        }
        EventData::Cgroup(c) => {
            writer.write_u64::<E>(c.id)?;
            write_aligned_string(&c.path, writer)?;
        }
        EventData::FinishedRound => {}
        EventData::AuxtraceInfo(info) => {
            writer.write_u32::<E>(info.type_)?;
            writer.write_u32::<E>(0)?;
            for value in &info.priv_data {
                writer.write_u64::<E>(*value)?;
            }
        }
        EventData::Auxtrace(a) => {
            writer.write_u64::<E>(a.size)?;
            writer.write_u64::<E>(a.offset)?;
            writer.write_u64::<E>(a.reference)?;
            writer.write_u32::<E>(a.idx)?;
            writer.write_u32::<E>(a.tid)?;
            writer.write_u32::<E>(a.cpu)?;
            writer.write_u32::<E>(0)?;
        }
        EventData::AuxtraceError(e) => {
            writer.write_u32::<E>(e.type_)?;
            writer.write_u32::<E>(e.code)?;
            writer.write_u32::<E>(e.cpu)?;
            writer.write_u32::<E>(e.pid)?;
            writer.write_u32::<E>(e.tid)?;
            writer.write_u32::<E>(0)?;
            writer.write_u64::<E>(e.ip)?;
            let msg_space = expected_size - PERF_EVENT_HEADER_SIZE - 32;
            let mut msg_bytes = vec![0u8; msg_space];
            let copy_len = e.msg.len().min(msg_space.saturating_sub(1));
            msg_bytes[..copy_len].copy_from_slice(&e.msg.as_bytes()[..copy_len]);
            writer.write_all(&msg_bytes)?;
        }
        EventData::ThreadMap(tm) => {
            writer.write_u64::<E>(tm.entries.len() as u64)?;
            for entry in &tm.entries {
                writer.write_u64::<E>(entry.pid)?;
                let mut comm_bytes = [0u8; THREAD_COMM_LEN];
                let copy_len = entry.comm.len().min(THREAD_COMM_LEN - 1);
                comm_bytes[..copy_len].copy_from_slice(&entry.comm.as_bytes()[..copy_len]);
                writer.write_all(&comm_bytes)?;
            }
        }
        EventData::StatConfig(sc) => {
            writer.write_u64::<E>(sc.data.len() as u64)?;
            for entry in &sc.data {
                writer.write_u64::<E>(entry.tag)?;
                writer.write_u64::<E>(entry.val)?;
            }
        }
        EventData::Stat(s) => {
            writer.write_u64::<E>(s.id)?;
            writer.write_u32::<E>(s.cpu)?;
            writer.write_u32::<E>(s.thread)?;
            writer.write_u64::<E>(s.value)?;
            writer.write_u64::<E>(s.enabled)?;
            writer.write_u64::<E>(s.running)?;
        }
        EventData::StatRound(sr) => {
            writer.write_u64::<E>(sr.type_)?;
            writer.write_u64::<E>(sr.time)?;
        }
        EventData::TimeConv(tc) => {
            writer.write_u64::<E>(tc.time_shift)?;
            writer.write_u64::<E>(tc.time_mult)?;
            writer.write_u64::<E>(tc.time_zero)?;
            if tc.is_large() {
                writer.write_u64::<E>(tc.time_cycles.unwrap_or(0))?;
                writer.write_u64::<E>(tc.time_mask.unwrap_or(0))?;
                writer.write_u8(tc.cap_user_time_zero.unwrap_or(false) as u8)?;
                writer.write_u8(tc.cap_user_time_short.unwrap_or(false) as u8)?;
                writer.write_all(&[0u8; 6])?;
            }
        }
    }

    if record.header.type_ != PERF_RECORD_SAMPLE {
        if let Some(info) = &record.sample_info {
            let id = info.id.unwrap_or(0);
            let reader = registry.reader_for_id(id).ok_or(Error::NoReaderForId(id))?;
            reader.write_trailer(info, writer)?;
        }
    }

    // AUXTRACE trace bytes live after the record in the data stream.
    if let EventData::Auxtrace(a) = &record.data {
        writer.write_all(&a.trace_data)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttrFlags, PerfEventAttr, PerfFileAttr, SampleFormat};

    fn registry(sample_type: SampleFormat, sample_id_all: bool, ids: Vec<u64>) -> SampleInfoRegistry {
        let mut flags = AttrFlags::empty();
        if sample_id_all {
            flags |= AttrFlags::SAMPLE_ID_ALL;
        }
        let mut registry = SampleInfoRegistry::new();
        registry
            .add_attr(&PerfFileAttr {
                attr: PerfEventAttr {
                    sample_format: sample_type,
                    flags,
                    ..Default::default()
                },
                ids,
                name: None,
            })
            .unwrap();
        registry
    }

    fn round_trip(record: &EventRecord, registry: &SampleInfoRegistry) -> EventRecord {
        let mut buf = Vec::new();
        write_event(record, registry, &mut buf).unwrap();
        let header = EventHeader {
            type_: LittleEndian::read_u32(&buf[0..4]),
            misc: LittleEndian::read_u16(&buf[4..6]),
            size: LittleEndian::read_u16(&buf[6..8]),
        };
        let body_len = header.size as usize - PERF_EVENT_HEADER_SIZE;
        let parsed =
            parse_event::<LittleEndian>(header, &buf[8..8 + body_len], registry).unwrap();
        // Check the emitted length against the size functions.
        let mut expected_len = event_size(&parsed, registry).unwrap();
        if let EventData::Auxtrace(a) = &record.data {
            expected_len += a.trace_data.len();
        }
        assert_eq!(buf.len(), expected_len);
        parsed
    }

    #[test]
    fn mmap_round_trip_with_trailer() {
        let registry = registry(
            SampleFormat::IP | SampleFormat::TID | SampleFormat::TIME | SampleFormat::ID,
            true,
            vec![42],
        );
        let mut record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_MMAP,
                misc: PERF_RECORD_MISC_USER,
                size: 0,
            },
            data: EventData::Mmap(MmapEvent {
                pid: 1001,
                tid: 1001,
                start: 0x1c1000,
                len: 0x1000,
                pgoff: 0,
                filename: "/usr/lib/foo.so".into(),
            }),
            sample_info: Some(SampleInfo {
                pid: Some(1001),
                tid: Some(1001),
                time: Some(123),
                id: Some(42),
                ..Default::default()
            }),
        };
        record.header.size = event_size(&record, &registry).unwrap() as u16;
        let parsed = round_trip(&record, &registry);
        assert_eq!(parsed, record);
    }

    #[test]
    fn mmap2_build_id_layout_round_trip() {
        let registry = registry(SampleFormat::IP, false, vec![1]);
        let mut record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_MMAP2,
                misc: PERF_RECORD_MISC_USER | PERF_RECORD_MISC_MMAP_BUILD_ID,
                size: 0,
            },
            data: EventData::Mmap2(Mmap2Event {
                pid: 88,
                tid: 88,
                start: 0x7f00_0000,
                len: 0x2000,
                pgoff: 0x1000,
                file_id: Mmap2FileId::BuildId(vec![0xde, 0xad, 0xbe, 0xef]),
                prot: 5,
                flags: 2,
                filename: "/tmp/t/file".into(),
            }),
            sample_info: None,
        };
        record.header.size = event_size(&record, &registry).unwrap() as u16;
        let parsed = round_trip(&record, &registry);
        assert_eq!(parsed, record);
    }

    #[test]
    fn comm_event_size_is_recomputed_on_write() {
        let registry = registry(SampleFormat::IP, false, vec![1]);
        let record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_COMM,
                misc: 0,
                // A stale size, as left behind by a comm-string rewrite.
                size: 200,
            },
            data: EventData::Comm(CommEvent {
                pid: 4,
                tid: 4,
                comm: "bash".into(),
            }),
            sample_info: None,
        };
        let mut buf = Vec::new();
        write_event(&record, &registry, &mut buf).unwrap();
        let written_size = LittleEndian::read_u16(&buf[6..8]) as usize;
        assert_eq!(written_size, buf.len());
        assert_eq!(written_size, 8 + 8 + align8("bash".len() + 1));
    }

    #[test]
    fn switch_cpu_wide_round_trip_preserves_misc() {
        let registry = registry(SampleFormat::IP | SampleFormat::TID, true, vec![7]);
        let mut record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_SWITCH_CPU_WIDE,
                misc: PERF_RECORD_MISC_SWITCH_OUT,
                size: 0,
            },
            data: EventData::ContextSwitch(ContextSwitchEvent {
                next_prev_pid: Some(5),
                next_prev_tid: Some(6),
            }),
            sample_info: Some(SampleInfo {
                pid: Some(1),
                tid: Some(2),
                ..Default::default()
            }),
        };
        record.header.size = event_size(&record, &registry).unwrap() as u16;
        let parsed = round_trip(&record, &registry);
        assert_eq!(parsed, record);
        assert_eq!(parsed.header.misc & PERF_RECORD_MISC_SWITCH_OUT, PERF_RECORD_MISC_SWITCH_OUT);
    }

    #[test]
    fn time_conv_small_and_large_variants() {
        let registry = registry(SampleFormat::IP, false, vec![1]);
        let mut small = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_TIME_CONV,
                misc: 0,
                size: 0,
            },
            data: EventData::TimeConv(TimeConvEvent {
                time_shift: 10,
                time_mult: 20,
                time_zero: 30,
                ..Default::default()
            }),
            sample_info: None,
        };
        small.header.size = event_size(&small, &registry).unwrap() as u16;
        assert_eq!(small.header.size, 8 + 24);
        assert_eq!(round_trip(&small, &registry), small);

        let mut large = small.clone();
        large.data = EventData::TimeConv(TimeConvEvent {
            time_shift: 10,
            time_mult: 20,
            time_zero: 30,
            time_cycles: Some(40),
            time_mask: Some(50),
            cap_user_time_zero: Some(true),
            cap_user_time_short: Some(false),
        });
        large.header.size = event_size(&large, &registry).unwrap() as u16;
        assert_eq!(large.header.size, 8 + 48);
        assert_eq!(round_trip(&large, &registry), large);
    }

    #[test]
    fn namespaces_count_drives_variable_payload() {
        let registry = registry(SampleFormat::IP | SampleFormat::TID, true, vec![9]);
        let mut record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_NAMESPACES,
                misc: 0,
                size: 0,
            },
            data: EventData::Namespaces(NamespacesEvent {
                pid: 1,
                tid: 1,
                link_info: vec![
                    NsLinkInfo { dev: 1, ino: 2 },
                    NsLinkInfo { dev: 3, ino: 4 },
                ],
            }),
            sample_info: Some(SampleInfo {
                pid: Some(1),
                tid: Some(1),
                ..Default::default()
            }),
        };
        record.header.size = event_size(&record, &registry).unwrap() as u16;
        assert_eq!(round_trip(&record, &registry), record);
    }

    #[test]
    fn sample_round_trips_through_codec() {
        let registry = registry(
            SampleFormat::IDENTIFIER | SampleFormat::IP | SampleFormat::TID | SampleFormat::TIME,
            true,
            vec![3],
        );
        let mut record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_SAMPLE,
                misc: PERF_RECORD_MISC_USER,
                size: 0,
            },
            data: EventData::Sample(SampleEvent {
                id: Some(3),
                ip: Some(0x1c100a),
                pid: Some(1001),
                tid: Some(1001),
                time: Some(1_002_003),
                ..Default::default()
            }),
            sample_info: None,
        };
        record.header.size = event_size(&record, &registry).unwrap() as u16;
        assert_eq!(round_trip(&record, &registry), record);
    }

    #[test]
    fn mismatched_size_is_rejected() {
        let registry = registry(SampleFormat::IP, false, vec![1]);
        let record = EventRecord {
            header: EventHeader {
                type_: PERF_RECORD_LOST,
                misc: 0,
                size: 100,
            },
            data: EventData::Lost(LostEvent { id: 1, lost: 2 }),
            sample_info: None,
        };
        let mut buf = Vec::new();
        assert!(write_event(&record, &registry, &mut buf).is_err());
    }
}
