//! The sample-info layout engine.
//!
//! Every SAMPLE record, and every other kernel record when `sample_id_all`
//! is set, carries fields selected by the producing attribute's
//! `sample_type`. The layout is a fixed canonical field sequence filtered by
//! the bitmask; this module owns that sequence (one table consumed by the
//! read, write and size paths), locates the event ID inside it, and keeps
//! the per-event-ID reader registry.

use std::collections::BTreeMap;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::attr::{BranchSampleFormat, PerfEventAttr, PerfFileAttr, ReadFormat, SampleFormat};
use crate::consts::*;
use crate::error::{Error, Result};
use crate::record::{
    BranchEntry, BranchStack, ReadInfo, ReadValue, SampleEvent, SampleInfo, WeightStruct,
};

/// The canonical on-disk order of sample payload fields. This is the order
/// the kernel emits them in, which is not the numeric order of the
/// `sample_type` bits (READ precedes CALLCHAIN but has a higher bit than
/// TID, for example).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleField {
    Identifier,
    Ip,
    Tid,
    Time,
    Addr,
    Id,
    StreamId,
    Cpu,
    Period,
    Read,
    Callchain,
    Raw,
    BranchStack,
    Weight,
    DataSrc,
    Transaction,
    PhysAddr,
    Cgroup,
    DataPageSize,
    CodePageSize,
    WeightStruct,
}

const SAMPLE_FIELD_ORDER: &[(SampleFormat, SampleField)] = &[
    (SampleFormat::IDENTIFIER, SampleField::Identifier),
    (SampleFormat::IP, SampleField::Ip),
    (SampleFormat::TID, SampleField::Tid),
    (SampleFormat::TIME, SampleField::Time),
    (SampleFormat::ADDR, SampleField::Addr),
    (SampleFormat::ID, SampleField::Id),
    (SampleFormat::STREAM_ID, SampleField::StreamId),
    (SampleFormat::CPU, SampleField::Cpu),
    (SampleFormat::PERIOD, SampleField::Period),
    (SampleFormat::READ, SampleField::Read),
    (SampleFormat::CALLCHAIN, SampleField::Callchain),
    (SampleFormat::RAW, SampleField::Raw),
    (SampleFormat::BRANCH_STACK, SampleField::BranchStack),
    (SampleFormat::WEIGHT, SampleField::Weight),
    (SampleFormat::DATA_SRC, SampleField::DataSrc),
    (SampleFormat::TRANSACTION, SampleField::Transaction),
    (SampleFormat::PHYS_ADDR, SampleField::PhysAddr),
    (SampleFormat::CGROUP, SampleField::Cgroup),
    (SampleFormat::DATA_PAGE_SIZE, SampleField::DataPageSize),
    (SampleFormat::CODE_PAGE_SIZE, SampleField::CodePageSize),
    (SampleFormat::WEIGHT_STRUCT, SampleField::WeightStruct),
];

/// The on-disk order of the `sample_id` trailer appended to non-SAMPLE
/// records.
const TRAILER_FIELD_ORDER: &[(SampleFormat, SampleField)] = &[
    (SampleFormat::TID, SampleField::Tid),
    (SampleFormat::TIME, SampleField::Time),
    (SampleFormat::ID, SampleField::Id),
    (SampleFormat::STREAM_ID, SampleField::StreamId),
    (SampleFormat::CPU, SampleField::Cpu),
    (SampleFormat::IDENTIFIER, SampleField::Identifier),
];

/// Sample-type bits whose payload layout this crate does not parse.
const UNSUPPORTED_SAMPLE_BITS: SampleFormat = SampleFormat::from_bits_truncate(
    PERF_SAMPLE_REGS_USER | PERF_SAMPLE_STACK_USER | PERF_SAMPLE_REGS_INTR | PERF_SAMPLE_AUX,
);

/// Parses and emits the sample fields selected by one attribute.
#[derive(Debug, Clone)]
pub struct SampleInfoReader {
    attr: PerfEventAttr,
}

impl SampleInfoReader {
    pub fn new(attr: PerfEventAttr) -> Self {
        let unsupported = attr.sample_format & UNSUPPORTED_SAMPLE_BITS;
        if !unsupported.is_empty() {
            log::warn!(
                "sample_type selects unsupported fields {unsupported:?}; samples of this \
                 attribute will fail to parse"
            );
        }
        Self { attr }
    }

    pub fn attr(&self) -> &PerfEventAttr {
        &self.attr
    }

    /// Byte length of the `sample_id` trailer this attribute produces.
    pub fn trailer_size(&self) -> usize {
        TRAILER_FIELD_ORDER
            .iter()
            .filter(|(bit, _)| self.attr.sample_format.contains(*bit))
            .count()
            * 8
    }

    /// Parses a full SAMPLE payload. The slice must span exactly the payload.
    pub fn parse_sample<T: ByteOrder>(&self, data: &[u8]) -> Result<SampleEvent> {
        let fmt = self.attr.sample_format;
        let mut cur = data;
        let mut sample = SampleEvent::default();
        let mut identifier = None;

        for (bit, field) in SAMPLE_FIELD_ORDER {
            if !fmt.contains(*bit) {
                continue;
            }
            match field {
                SampleField::Identifier => identifier = Some(cur.read_u64::<T>()?),
                SampleField::Ip => sample.ip = Some(cur.read_u64::<T>()?),
                SampleField::Tid => {
                    sample.pid = Some(cur.read_u32::<T>()?);
                    sample.tid = Some(cur.read_u32::<T>()?);
                }
                SampleField::Time => sample.time = Some(cur.read_u64::<T>()?),
                SampleField::Addr => sample.addr = Some(cur.read_u64::<T>()?),
                SampleField::Id => sample.id = Some(cur.read_u64::<T>()?),
                SampleField::StreamId => sample.stream_id = Some(cur.read_u64::<T>()?),
                SampleField::Cpu => {
                    sample.cpu = Some(cur.read_u32::<T>()?);
                    let _res = cur.read_u32::<T>()?;
                }
                SampleField::Period => sample.period = Some(cur.read_u64::<T>()?),
                SampleField::Read => sample.read_info = Some(self.parse_read_info::<T>(&mut cur)?),
                SampleField::Callchain => {
                    let nr = cur.read_u64::<T>()? as usize;
                    check_count(nr, 8, cur.len(), "callchain")?;
                    let mut ips = Vec::with_capacity(nr);
                    for _ in 0..nr {
                        ips.push(cur.read_u64::<T>()?);
                    }
                    sample.callchain = Some(ips);
                }
                SampleField::Raw => {
                    let size = cur.read_u32::<T>()? as usize;
                    check_count(size, 1, cur.len(), "raw data")?;
                    let mut raw = vec![0u8; size];
                    std::io::Read::read_exact(&mut cur, &mut raw)?;
                    sample.raw = Some(raw);
                }
                SampleField::BranchStack => {
                    let nr = cur.read_u64::<T>()? as usize;
                    let hw_idx = if self
                        .attr
                        .branch_sample_format
                        .contains(BranchSampleFormat::HW_INDEX)
                    {
                        Some(cur.read_u64::<T>()?)
                    } else {
                        None
                    };
                    check_count(nr, 24, cur.len(), "branch stack")?;
                    let mut entries = Vec::with_capacity(nr);
                    for _ in 0..nr {
                        let from = cur.read_u64::<T>()?;
                        let to = cur.read_u64::<T>()?;
                        let flags = cur.read_u64::<T>()?;
                        if flags >> 26 != 0 {
                            log::warn!("ignoring branch stack entry reserved bits: {:#x}", flags >> 26);
                        }
                        entries.push(BranchEntry::from_flags(from, to, flags));
                    }
                    sample.branch_stack = Some(BranchStack { hw_idx, entries });
                }
                SampleField::Weight => sample.weight = Some(cur.read_u64::<T>()?),
                SampleField::DataSrc => sample.data_src = Some(cur.read_u64::<T>()?),
                SampleField::Transaction => sample.transaction = Some(cur.read_u64::<T>()?),
                SampleField::PhysAddr => sample.phys_addr = Some(cur.read_u64::<T>()?),
                SampleField::Cgroup => sample.cgroup = Some(cur.read_u64::<T>()?),
                SampleField::DataPageSize => sample.data_page_size = Some(cur.read_u64::<T>()?),
                SampleField::CodePageSize => sample.code_page_size = Some(cur.read_u64::<T>()?),
                SampleField::WeightStruct => {
                    sample.weight_struct = Some(WeightStruct {
                        var1_dw: cur.read_u32::<T>()?,
                        var2_w: cur.read_u16::<T>()?,
                        var3_w: cur.read_u16::<T>()?,
                    })
                }
            }
        }

        // An IDENTIFIER and an ID field carry the same value.
        sample.id = identifier.or(sample.id);

        if !cur.is_empty() {
            return Err(Error::format(format!(
                "{} bytes of sample payload were not consumed; sample_type {:#x} \
                 does not describe the payload",
                cur.len(),
                fmt.bits()
            )));
        }
        Ok(sample)
    }

    fn parse_read_info<T: ByteOrder>(&self, cur: &mut &[u8]) -> Result<ReadInfo> {
        let read_format = self.attr.read_format;
        let mut info = ReadInfo::default();
        if read_format.contains(ReadFormat::GROUP) {
            let nr = cur.read_u64::<T>()? as usize;
            if read_format.contains(ReadFormat::TOTAL_TIME_ENABLED) {
                info.time_enabled = Some(cur.read_u64::<T>()?);
            }
            if read_format.contains(ReadFormat::TOTAL_TIME_RUNNING) {
                info.time_running = Some(cur.read_u64::<T>()?);
            }
            check_count(nr, 8, cur.len(), "read group")?;
            for _ in 0..nr {
                let value = cur.read_u64::<T>()?;
                let id = if read_format.contains(ReadFormat::ID) {
                    Some(cur.read_u64::<T>()?)
                } else {
                    None
                };
                info.values.push(ReadValue { value, id });
            }
        } else {
            let value = cur.read_u64::<T>()?;
            if read_format.contains(ReadFormat::TOTAL_TIME_ENABLED) {
                info.time_enabled = Some(cur.read_u64::<T>()?);
            }
            if read_format.contains(ReadFormat::TOTAL_TIME_RUNNING) {
                info.time_running = Some(cur.read_u64::<T>()?);
            }
            let id = if read_format.contains(ReadFormat::ID) {
                Some(cur.read_u64::<T>()?)
            } else {
                None
            };
            info.values.push(ReadValue { value, id });
        }
        Ok(info)
    }

    /// Emits a full SAMPLE payload, little-endian.
    pub fn write_sample<W: Write>(&self, sample: &SampleEvent, writer: &mut W) -> Result<()> {
        type E = LittleEndian;
        let fmt = self.attr.sample_format;

        for (bit, field) in SAMPLE_FIELD_ORDER {
            if !fmt.contains(*bit) {
                continue;
            }
            match field {
                SampleField::Identifier | SampleField::Id => {
                    writer.write_u64::<E>(sample.id.unwrap_or(0))?
                }
                SampleField::Ip => writer.write_u64::<E>(sample.ip.unwrap_or(0))?,
                SampleField::Tid => {
                    writer.write_u32::<E>(sample.pid.unwrap_or(0))?;
                    writer.write_u32::<E>(sample.tid.unwrap_or(0))?;
                }
                SampleField::Time => writer.write_u64::<E>(sample.time.unwrap_or(0))?,
                SampleField::Addr => writer.write_u64::<E>(sample.addr.unwrap_or(0))?,
                SampleField::StreamId => writer.write_u64::<E>(sample.stream_id.unwrap_or(0))?,
                SampleField::Cpu => {
                    writer.write_u32::<E>(sample.cpu.unwrap_or(0))?;
                    writer.write_u32::<E>(0)?;
                }
                SampleField::Period => writer.write_u64::<E>(sample.period.unwrap_or(0))?,
                SampleField::Read => {
                    let info = sample.read_info.clone().unwrap_or_default();
                    self.write_read_info(&info, writer)?;
                }
                SampleField::Callchain => {
                    let chain = sample.callchain.as_deref().unwrap_or(&[]);
                    writer.write_u64::<E>(chain.len() as u64)?;
                    for ip in chain {
                        writer.write_u64::<E>(*ip)?;
                    }
                }
                SampleField::Raw => {
                    let raw = sample.raw.as_deref().unwrap_or(&[]);
                    writer.write_u32::<E>(raw.len() as u32)?;
                    writer.write_all(raw)?;
                }
                SampleField::BranchStack => {
                    let stack_storage;
                    let stack = match &sample.branch_stack {
                        Some(s) => s,
                        None => {
                            stack_storage = BranchStack::default();
                            &stack_storage
                        }
                    };
                    writer.write_u64::<E>(stack.entries.len() as u64)?;
                    if self
                        .attr
                        .branch_sample_format
                        .contains(BranchSampleFormat::HW_INDEX)
                    {
                        writer.write_u64::<E>(stack.hw_idx.unwrap_or(0))?;
                    }
                    for entry in &stack.entries {
                        writer.write_u64::<E>(entry.from)?;
                        writer.write_u64::<E>(entry.to)?;
                        writer.write_u64::<E>(entry.flags())?;
                    }
                }
                SampleField::Weight => writer.write_u64::<E>(sample.weight.unwrap_or(0))?,
                SampleField::DataSrc => writer.write_u64::<E>(sample.data_src.unwrap_or(0))?,
                SampleField::Transaction => {
                    writer.write_u64::<E>(sample.transaction.unwrap_or(0))?
                }
                SampleField::PhysAddr => writer.write_u64::<E>(sample.phys_addr.unwrap_or(0))?,
                SampleField::Cgroup => writer.write_u64::<E>(sample.cgroup.unwrap_or(0))?,
                SampleField::DataPageSize => {
                    writer.write_u64::<E>(sample.data_page_size.unwrap_or(0))?
                }
                SampleField::CodePageSize => {
                    writer.write_u64::<E>(sample.code_page_size.unwrap_or(0))?
                }
                SampleField::WeightStruct => {
                    let ws = sample.weight_struct.unwrap_or_default();
                    writer.write_u32::<E>(ws.var1_dw)?;
                    writer.write_u16::<E>(ws.var2_w)?;
                    writer.write_u16::<E>(ws.var3_w)?;
                }
            }
        }
        Ok(())
    }

    fn write_read_info<W: Write>(&self, info: &ReadInfo, writer: &mut W) -> Result<()> {
        type E = LittleEndian;
        let read_format = self.attr.read_format;
        if read_format.contains(ReadFormat::GROUP) {
            writer.write_u64::<E>(info.values.len() as u64)?;
            if read_format.contains(ReadFormat::TOTAL_TIME_ENABLED) {
                writer.write_u64::<E>(info.time_enabled.unwrap_or(0))?;
            }
            if read_format.contains(ReadFormat::TOTAL_TIME_RUNNING) {
                writer.write_u64::<E>(info.time_running.unwrap_or(0))?;
            }
            for value in &info.values {
                writer.write_u64::<E>(value.value)?;
                if read_format.contains(ReadFormat::ID) {
                    writer.write_u64::<E>(value.id.unwrap_or(0))?;
                }
            }
        } else {
            let first = info.values.first().copied().unwrap_or_default();
            writer.write_u64::<E>(first.value)?;
            if read_format.contains(ReadFormat::TOTAL_TIME_ENABLED) {
                writer.write_u64::<E>(info.time_enabled.unwrap_or(0))?;
            }
            if read_format.contains(ReadFormat::TOTAL_TIME_RUNNING) {
                writer.write_u64::<E>(info.time_running.unwrap_or(0))?;
            }
            if read_format.contains(ReadFormat::ID) {
                writer.write_u64::<E>(first.id.unwrap_or(0))?;
            }
        }
        Ok(())
    }

    /// Byte length `write_sample` will produce for this sample.
    pub fn sample_payload_size(&self, sample: &SampleEvent) -> usize {
        let fmt = self.attr.sample_format;
        let read_format = self.attr.read_format;
        let mut size = 0usize;
        for (bit, field) in SAMPLE_FIELD_ORDER {
            if !fmt.contains(*bit) {
                continue;
            }
            size += match field {
                SampleField::Tid
                | SampleField::Cpu
                | SampleField::Identifier
                | SampleField::Ip
                | SampleField::Time
                | SampleField::Addr
                | SampleField::Id
                | SampleField::StreamId
                | SampleField::Period
                | SampleField::Weight
                | SampleField::DataSrc
                | SampleField::Transaction
                | SampleField::PhysAddr
                | SampleField::Cgroup
                | SampleField::DataPageSize
                | SampleField::CodePageSize
                | SampleField::WeightStruct => 8,
                SampleField::Read => {
                    let nr = sample
                        .read_info
                        .as_ref()
                        .map(|i| i.values.len())
                        .unwrap_or(0);
                    let per_value =
                        8 + if read_format.contains(ReadFormat::ID) { 8 } else { 0 };
                    let times = 8 * (read_format.contains(ReadFormat::TOTAL_TIME_ENABLED) as usize
                        + read_format.contains(ReadFormat::TOTAL_TIME_RUNNING) as usize);
                    if read_format.contains(ReadFormat::GROUP) {
                        8 + times + nr * per_value
                    } else {
                        times + per_value
                    }
                }
                SampleField::Callchain => {
                    8 + 8 * sample.callchain.as_ref().map(|c| c.len()).unwrap_or(0)
                }
                SampleField::Raw => 4 + sample.raw.as_ref().map(|r| r.len()).unwrap_or(0),
                SampleField::BranchStack => {
                    let nr = sample
                        .branch_stack
                        .as_ref()
                        .map(|b| b.entries.len())
                        .unwrap_or(0);
                    let hw_idx = self
                        .attr
                        .branch_sample_format
                        .contains(BranchSampleFormat::HW_INDEX);
                    8 + if hw_idx { 8 } else { 0 } + 24 * nr
                }
            };
        }
        size
    }

    /// Parses a `sample_id` trailer. The slice must span exactly the trailer.
    pub fn parse_trailer<T: ByteOrder>(&self, data: &[u8]) -> Result<SampleInfo> {
        if data.len() != self.trailer_size() {
            return Err(Error::format(format!(
                "sample info trailer is {} bytes, expected {}",
                data.len(),
                self.trailer_size()
            )));
        }
        let fmt = self.attr.sample_format;
        let mut cur = data;
        let mut info = SampleInfo::default();
        let mut identifier = None;
        for (bit, field) in TRAILER_FIELD_ORDER {
            if !fmt.contains(*bit) {
                continue;
            }
            match field {
                SampleField::Tid => {
                    info.pid = Some(cur.read_u32::<T>()?);
                    info.tid = Some(cur.read_u32::<T>()?);
                }
                SampleField::Time => info.time = Some(cur.read_u64::<T>()?),
                SampleField::Id => info.id = Some(cur.read_u64::<T>()?),
                SampleField::StreamId => info.stream_id = Some(cur.read_u64::<T>()?),
                SampleField::Cpu => {
                    info.cpu = Some(cur.read_u32::<T>()?);
                    let _res = cur.read_u32::<T>()?;
                }
                SampleField::Identifier => identifier = Some(cur.read_u64::<T>()?),
                _ => unreachable!(),
            }
        }
        info.id = identifier.or(info.id);
        Ok(info)
    }

    /// Emits a `sample_id` trailer, little-endian.
    pub fn write_trailer<W: Write>(&self, info: &SampleInfo, writer: &mut W) -> Result<()> {
        type E = LittleEndian;
        let fmt = self.attr.sample_format;
        for (bit, field) in TRAILER_FIELD_ORDER {
            if !fmt.contains(*bit) {
                continue;
            }
            match field {
                SampleField::Tid => {
                    writer.write_u32::<E>(info.pid.unwrap_or(0))?;
                    writer.write_u32::<E>(info.tid.unwrap_or(0))?;
                }
                SampleField::Time => writer.write_u64::<E>(info.time.unwrap_or(0))?,
                SampleField::Id | SampleField::Identifier => {
                    writer.write_u64::<E>(info.id.unwrap_or(0))?
                }
                SampleField::StreamId => writer.write_u64::<E>(info.stream_id.unwrap_or(0))?,
                SampleField::Cpu => {
                    writer.write_u32::<E>(info.cpu.unwrap_or(0))?;
                    writer.write_u32::<E>(0)?;
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }
}

fn check_count(count: usize, elem_size: usize, remaining: usize, what: &'static str) -> Result<()> {
    let needed = (count as u64).saturating_mul(elem_size as u64);
    if needed > remaining as u64 {
        return Err(Error::Truncation {
            what,
            declared: needed,
            remaining: remaining as u64,
        });
    }
    Ok(())
}

/// Position of the event ID within a record's sample-info fields, in u64
/// units. For SAMPLE records the position counts from the start of the
/// payload; for other records it counts from the *end* of the trailer, so
/// that CPU/STREAM_ID fields after the ID do not shift it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPos {
    NotPresent,
    At(usize),
}

impl IdPos {
    fn as_i64(self) -> i64 {
        match self {
            IdPos::NotPresent => -1,
            IdPos::At(n) => n as i64,
        }
    }
}

fn derive_id_positions(fmt: SampleFormat) -> (IdPos, IdPos) {
    if fmt.contains(SampleFormat::IDENTIFIER) {
        (IdPos::At(0), IdPos::At(1))
    } else if fmt.contains(SampleFormat::ID) {
        let sample_pos = fmt
            .intersection(
                SampleFormat::IP | SampleFormat::TID | SampleFormat::TIME | SampleFormat::ADDR,
            )
            .bits()
            .count_ones() as usize;
        let other_pos = 1 + fmt
            .intersection(SampleFormat::CPU | SampleFormat::STREAM_ID)
            .bits()
            .count_ones() as usize;
        (IdPos::At(sample_pos), IdPos::At(other_pos))
    } else {
        (IdPos::NotPresent, IdPos::NotPresent)
    }
}

/// The per-event-ID reader registry, plus the event-ID locator state shared
/// by all attributes of one profile.
#[derive(Debug, Default)]
pub struct SampleInfoRegistry {
    readers: BTreeMap<u64, SampleInfoReader>,
    sample_id_pos: Option<IdPos>,
    other_id_pos: Option<IdPos>,
}

impl SampleInfoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Registers a reader for each of the attr's IDs (or under ID 0 for an
    /// attr with no IDs) and folds the attr into the shared event-ID
    /// positions, failing when attrs disagree.
    pub fn add_attr(&mut self, attr: &PerfFileAttr) -> Result<()> {
        if attr.ids.is_empty() {
            self.readers.insert(0, SampleInfoReader::new(attr.attr));
        } else {
            for id in &attr.ids {
                self.readers.insert(*id, SampleInfoReader::new(attr.attr));
            }
        }

        let (sample_pos, other_pos) = derive_id_positions(attr.attr.sample_format);
        for (existing, new) in [
            (&mut self.sample_id_pos, sample_pos),
            (&mut self.other_id_pos, other_pos),
        ] {
            match existing {
                None => *existing = Some(new),
                Some(current) if *current != new => {
                    return Err(Error::InconsistentEventIdPosition {
                        existing: current.as_i64(),
                        new: new.as_i64(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Looks up the reader for an event ID. ID 0 (or an ID-less record)
    /// falls back to the first registered reader, which is how files written
    /// before IDs were recorded are read.
    pub fn reader_for_id(&self, id: u64) -> Option<&SampleInfoReader> {
        if id != 0 {
            return self.readers.get(&id);
        }
        self.readers.values().next()
    }

    fn first_reader(&self) -> Option<&SampleInfoReader> {
        self.readers.values().next()
    }

    /// Whether all attributes were configured with `sample_id_all`, read off
    /// the first attribute (the reader requires consistency).
    pub fn sample_id_all(&self) -> bool {
        self.first_reader()
            .map(|r| r.attr().sample_id_all())
            .unwrap_or(false)
    }

    /// Extracts the event ID from a SAMPLE payload.
    pub fn event_id_from_sample<T: ByteOrder>(&self, payload: &[u8]) -> Result<u64> {
        match self.sample_id_pos {
            None => Err(Error::format("event ID position was never initialized")),
            Some(IdPos::NotPresent) => Ok(0),
            Some(IdPos::At(pos)) => {
                let offset = pos * 8;
                if payload.len() < offset + 8 {
                    return Err(Error::format(format!(
                        "sample payload of {} bytes has no event ID at u64 position {pos}",
                        payload.len()
                    )));
                }
                Ok(T::read_u64(&payload[offset..offset + 8]))
            }
        }
    }

    /// Extracts the event ID from the sample-info trailer of a non-SAMPLE
    /// record; `trailer` spans the record body *after* the fixed and
    /// variable payload.
    pub fn event_id_from_trailer<T: ByteOrder>(&self, trailer: &[u8]) -> Result<u64> {
        match self.other_id_pos {
            None => Err(Error::format("event ID position was never initialized")),
            Some(IdPos::NotPresent) => Ok(0),
            Some(IdPos::At(pos_from_end)) => {
                let len = trailer.len();
                if len < pos_from_end * 8 {
                    return Err(Error::format(format!(
                        "sample info trailer of {len} bytes cannot hold an event ID at \
                         u64 position {pos_from_end} from the end"
                    )));
                }
                let offset = len - pos_from_end * 8;
                Ok(T::read_u64(&trailer[offset..offset + 8]))
            }
        }
    }
}
