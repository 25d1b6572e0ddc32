//! The in-memory, structured form of one captured record.
//!
//! Every record is an [`EventRecord`] envelope: the 8-byte event header, a
//! tagged payload chosen by `header.type_`, and, for kernel records produced
//! with `sample_id_all`, the parsed sample-info trailer. Fields that the
//! producing attribute did not select are `None`, so absent and zero-valued
//! fields stay distinguishable.

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// The pseudo-pid under which kernel mappings are recorded.
pub const KERNEL_PID: u32 = u32::MAX;

/// `perf_event_header`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventHeader {
    pub type_: u32,
    pub misc: u16,
    pub size: u16,
}

impl EventHeader {
    pub fn is_user_type(&self) -> bool {
        self.type_ >= PERF_RECORD_USER_TYPE_START
    }
}

/// Where a record was captured, from the cpumode bits of `header.misc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuMode {
    Unknown,
    Kernel,
    User,
    Hypervisor,
    GuestKernel,
    GuestUser,
}

impl CpuMode {
    pub fn from_misc(misc: u16) -> Self {
        match misc & PERF_RECORD_MISC_CPUMODE_MASK {
            PERF_RECORD_MISC_KERNEL => Self::Kernel,
            PERF_RECORD_MISC_USER => Self::User,
            PERF_RECORD_MISC_HYPERVISOR => Self::Hypervisor,
            PERF_RECORD_MISC_GUEST_KERNEL => Self::GuestKernel,
            PERF_RECORD_MISC_GUEST_USER => Self::GuestUser,
            _ => Self::Unknown,
        }
    }
}

/// The sample-info trailer shared by kernel records when `sample_id_all` is
/// set on the producing attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SampleInfo {
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub time: Option<u64>,
    pub id: Option<u64>,
    pub stream_id: Option<u64>,
    pub cpu: Option<u32>,
}

/// Counter values accompanying a sample when `PERF_SAMPLE_READ` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReadInfo {
    pub time_enabled: Option<u64>,
    pub time_running: Option<u64>,
    pub values: Vec<ReadValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReadValue {
    pub value: u64,
    pub id: Option<u64>,
}

/// One taken-branch record from a sampled branch stack.
///
/// The flags word layout is `mispred:1 predicted:1 in_tx:1 abort:1 cycles:16
/// type:4 spec:2 reserved:38`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BranchEntry {
    pub from: u64,
    pub to: u64,
    pub mispredicted: bool,
    pub predicted: bool,
    pub in_transaction: bool,
    pub abort: bool,
    pub cycles: u16,
    pub branch_type: u8,
    pub spec: u8,
}

impl BranchEntry {
    pub fn from_flags(from: u64, to: u64, flags: u64) -> Self {
        Self {
            from,
            to,
            mispredicted: flags & 1 != 0,
            predicted: flags & (1 << 1) != 0,
            in_transaction: flags & (1 << 2) != 0,
            abort: flags & (1 << 3) != 0,
            cycles: ((flags >> 4) & 0xffff) as u16,
            branch_type: ((flags >> 20) & 0xf) as u8,
            spec: ((flags >> 24) & 0x3) as u8,
        }
    }

    pub fn flags(&self) -> u64 {
        (self.mispredicted as u64)
            | (self.predicted as u64) << 1
            | (self.in_transaction as u64) << 2
            | (self.abort as u64) << 3
            | (self.cycles as u64) << 4
            | (self.branch_type as u64) << 20
            | (self.spec as u64) << 24
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BranchStack {
    /// Present iff the attribute requested `BranchSampleFormat::HW_INDEX`.
    pub hw_idx: Option<u64>,
    pub entries: Vec<BranchEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WeightStruct {
    pub var1_dw: u32,
    pub var2_w: u16,
    pub var3_w: u16,
}

/// PERF_RECORD_SAMPLE. Each field is present iff the producing attribute's
/// `sample_type` selected it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SampleEvent {
    pub ip: Option<u64>,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub time: Option<u64>,
    pub addr: Option<u64>,
    pub id: Option<u64>,
    pub stream_id: Option<u64>,
    pub cpu: Option<u32>,
    pub period: Option<u64>,
    pub read_info: Option<ReadInfo>,
    pub callchain: Option<Vec<u64>>,
    pub raw: Option<Vec<u8>>,
    pub branch_stack: Option<BranchStack>,
    pub weight: Option<u64>,
    pub data_src: Option<u64>,
    pub transaction: Option<u64>,
    pub phys_addr: Option<u64>,
    pub cgroup: Option<u64>,
    pub data_page_size: Option<u64>,
    pub code_page_size: Option<u64>,
    pub weight_struct: Option<WeightStruct>,
}

/// PERF_RECORD_MMAP. Not emitted by current kernels for user mappings, but
/// perf still synthesizes them for the kernel image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MmapEvent {
    pub pid: u32,
    pub tid: u32,
    pub start: u64,
    pub len: u64,
    pub pgoff: u64,
    pub filename: String,
}

/// The per-file identification carried by an MMAP2 record: device/inode
/// numbers, or an inline build id when `misc & MMAP_BUILD_ID` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mmap2FileId {
    InodeAndVersion {
        maj: u32,
        min: u32,
        ino: u64,
        ino_generation: u64,
    },
    BuildId(Vec<u8>),
}

impl Default for Mmap2FileId {
    fn default() -> Self {
        Mmap2FileId::InodeAndVersion {
            maj: 0,
            min: 0,
            ino: 0,
            ino_generation: 0,
        }
    }
}

/// PERF_RECORD_MMAP2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Mmap2Event {
    pub pid: u32,
    pub tid: u32,
    pub start: u64,
    pub len: u64,
    pub pgoff: u64,
    pub file_id: Mmap2FileId,
    pub prot: u32,
    pub flags: u32,
    pub filename: String,
}

/// PERF_RECORD_COMM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommEvent {
    pub pid: u32,
    pub tid: u32,
    pub comm: String,
}

/// PERF_RECORD_FORK and PERF_RECORD_EXIT share this payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ForkEvent {
    pub pid: u32,
    pub ppid: u32,
    pub tid: u32,
    pub ptid: u32,
    pub time: u64,
}

/// PERF_RECORD_LOST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LostEvent {
    pub id: u64,
    pub lost: u64,
}

/// PERF_RECORD_THROTTLE / PERF_RECORD_UNTHROTTLE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThrottleEvent {
    pub time: u64,
    pub id: u64,
    pub stream_id: u64,
}

/// PERF_RECORD_AUX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuxEvent {
    pub aux_offset: u64,
    pub aux_size: u64,
    pub flags: u64,
}

impl AuxEvent {
    pub fn is_truncated(&self) -> bool {
        self.flags & PERF_AUX_FLAG_TRUNCATED != 0
    }
    pub fn is_overwrite(&self) -> bool {
        self.flags & PERF_AUX_FLAG_OVERWRITE != 0
    }
    pub fn is_partial(&self) -> bool {
        self.flags & PERF_AUX_FLAG_PARTIAL != 0
    }
}

/// PERF_RECORD_ITRACE_START
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ItraceStartEvent {
    pub pid: u32,
    pub tid: u32,
}

/// PERF_RECORD_LOST_SAMPLES
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LostSamplesEvent {
    pub lost: u64,
}

/// PERF_RECORD_SWITCH and PERF_RECORD_SWITCH_CPU_WIDE. The switch direction
/// lives in `header.misc` (`SWITCH_OUT`); only the cpu-wide form names the
/// other task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextSwitchEvent {
    pub next_prev_pid: Option<u32>,
    pub next_prev_tid: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NsLinkInfo {
    pub dev: u64,
    pub ino: u64,
}

/// PERF_RECORD_NAMESPACES
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NamespacesEvent {
    pub pid: u32,
    pub tid: u32,
    pub link_info: Vec<NsLinkInfo>,
}

/// PERF_RECORD_CGROUP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CgroupEvent {
    pub id: u64,
    pub path: String,
}

/// PERF_RECORD_AUXTRACE_INFO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuxtraceInfoEvent {
    pub type_: u32,
    pub priv_data: Vec<u64>,
}

/// PERF_RECORD_AUXTRACE. The trace bytes follow the record in the stream and
/// are sized by `size`, not by `header.size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuxtraceEvent {
    pub size: u64,
    pub offset: u64,
    pub reference: u64,
    pub idx: u32,
    pub tid: u32,
    pub cpu: u32,
    pub trace_data: Vec<u8>,
}

/// PERF_RECORD_AUXTRACE_ERROR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuxtraceErrorEvent {
    pub type_: u32,
    pub code: u32,
    pub cpu: u32,
    pub pid: u32,
    pub tid: u32,
    pub ip: u64,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThreadMapEntry {
    pub pid: u64,
    pub comm: String,
}

/// PERF_RECORD_THREAD_MAP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThreadMapEvent {
    pub entries: Vec<ThreadMapEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatConfigEntry {
    pub tag: u64,
    pub val: u64,
}

/// PERF_RECORD_STAT_CONFIG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatConfigEvent {
    pub data: Vec<StatConfigEntry>,
}

/// PERF_RECORD_STAT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatEvent {
    pub id: u64,
    pub cpu: u32,
    pub thread: u32,
    pub value: u64,
    pub enabled: u64,
    pub running: u64,
}

/// PERF_RECORD_STAT_ROUND
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatRoundEvent {
    pub type_: u64,
    pub time: u64,
}

/// PERF_RECORD_TIME_CONV. Kernels since 5.10 append four more fields; their
/// presence is signalled by `header.size` and kept here as `Option`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimeConvEvent {
    pub time_shift: u64,
    pub time_mult: u64,
    pub time_zero: u64,
    pub time_cycles: Option<u64>,
    pub time_mask: Option<u64>,
    pub cap_user_time_zero: Option<bool>,
    pub cap_user_time_short: Option<bool>,
}

impl TimeConvEvent {
    pub fn is_large(&self) -> bool {
        self.time_cycles.is_some()
    }
}

/// The payload of one record, discriminated by `header.type_`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
pub enum EventData {
    Sample(SampleEvent),
    Mmap(MmapEvent),
    Mmap2(Mmap2Event),
    Comm(CommEvent),
    Exit(ForkEvent),
    Fork(ForkEvent),
    Lost(LostEvent),
    Throttle(ThrottleEvent),
    Unthrottle(ThrottleEvent),
    Aux(AuxEvent),
    ItraceStart(ItraceStartEvent),
    LostSamples(LostSamplesEvent),
    ContextSwitch(ContextSwitchEvent),
    Namespaces(NamespacesEvent),
    Cgroup(CgroupEvent),
    FinishedRound,
    AuxtraceInfo(AuxtraceInfoEvent),
    Auxtrace(AuxtraceEvent),
    AuxtraceError(AuxtraceErrorEvent),
    ThreadMap(ThreadMapEvent),
    StatConfig(StatConfigEvent),
    Stat(StatEvent),
    StatRound(StatRoundEvent),
    TimeConv(TimeConvEvent),
}

/// One record of the profile: header, payload, and the optional sample-info
/// trailer of non-SAMPLE kernel records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub header: EventHeader,
    pub data: EventData,
    pub sample_info: Option<SampleInfo>,
}

impl EventRecord {
    /// The record's timestamp: the sample's own time for SAMPLE, the trailer
    /// time otherwise. Used for time-based sorting.
    pub fn timestamp(&self) -> Option<u64> {
        match &self.data {
            EventData::Sample(s) => s.time,
            _ => self.sample_info.as_ref().and_then(|si| si.time),
        }
    }

    /// The event ID that links the record to its producing attribute.
    pub fn event_id(&self) -> Option<u64> {
        match &self.data {
            EventData::Sample(s) => s.id,
            _ => self.sample_info.as_ref().and_then(|si| si.id),
        }
    }

    /// pid/tid of the context the record was produced in, if recorded.
    pub fn pid_tid(&self) -> (Option<u32>, Option<u32>) {
        match &self.data {
            EventData::Sample(s) => (s.pid, s.tid),
            _ => match &self.sample_info {
                Some(si) => (si.pid, si.tid),
                None => (None, None),
            },
        }
    }

    /// Common view of MMAP and MMAP2 geometry: (pid, start, len, pgoff, filename).
    pub fn mmap_parts(&self) -> Option<(u32, u64, u64, u64, &str)> {
        match &self.data {
            EventData::Mmap(m) => Some((m.pid, m.start, m.len, m.pgoff, m.filename.as_str())),
            EventData::Mmap2(m) => Some((m.pid, m.start, m.len, m.pgoff, m.filename.as_str())),
            _ => None,
        }
    }
}
