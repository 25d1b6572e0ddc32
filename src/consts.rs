//! Constants from the kernel's perf ABI and from the perf tool's file format.
//!
//! Values mirror `include/uapi/linux/perf_event.h` and
//! `tools/perf/util/header.h` of the kernel tree.

/// The first 64 bits of a perf.data file: "PERFILE2" read as a little-endian u64.
pub const PERF_MAGIC: u64 = 0x32454c4946524550;

// Kernel-generated record types.
pub const PERF_RECORD_MMAP: u32 = 1;
pub const PERF_RECORD_LOST: u32 = 2;
pub const PERF_RECORD_COMM: u32 = 3;
pub const PERF_RECORD_EXIT: u32 = 4;
pub const PERF_RECORD_THROTTLE: u32 = 5;
pub const PERF_RECORD_UNTHROTTLE: u32 = 6;
pub const PERF_RECORD_FORK: u32 = 7;
pub const PERF_RECORD_READ: u32 = 8;
pub const PERF_RECORD_SAMPLE: u32 = 9;
pub const PERF_RECORD_MMAP2: u32 = 10;
pub const PERF_RECORD_AUX: u32 = 11;
pub const PERF_RECORD_ITRACE_START: u32 = 12;
pub const PERF_RECORD_LOST_SAMPLES: u32 = 13;
pub const PERF_RECORD_SWITCH: u32 = 14;
pub const PERF_RECORD_SWITCH_CPU_WIDE: u32 = 15;
pub const PERF_RECORD_NAMESPACES: u32 = 16;
pub const PERF_RECORD_KSYMBOL: u32 = 17;
pub const PERF_RECORD_BPF_EVENT: u32 = 18;
pub const PERF_RECORD_CGROUP: u32 = 19;
pub const PERF_RECORD_TEXT_POKE: u32 = 20;

// Record types synthesized by the perf tool in user space.
pub const PERF_RECORD_USER_TYPE_START: u32 = 64;
pub const PERF_RECORD_HEADER_ATTR: u32 = 64;
pub const PERF_RECORD_HEADER_EVENT_TYPE: u32 = 65;
pub const PERF_RECORD_HEADER_TRACING_DATA: u32 = 66;
pub const PERF_RECORD_HEADER_BUILD_ID: u32 = 67;
pub const PERF_RECORD_FINISHED_ROUND: u32 = 68;
pub const PERF_RECORD_ID_INDEX: u32 = 69;
pub const PERF_RECORD_AUXTRACE_INFO: u32 = 70;
pub const PERF_RECORD_AUXTRACE: u32 = 71;
pub const PERF_RECORD_AUXTRACE_ERROR: u32 = 72;
pub const PERF_RECORD_THREAD_MAP: u32 = 73;
pub const PERF_RECORD_CPU_MAP: u32 = 74;
pub const PERF_RECORD_STAT_CONFIG: u32 = 75;
pub const PERF_RECORD_STAT: u32 = 76;
pub const PERF_RECORD_STAT_ROUND: u32 = 77;
pub const PERF_RECORD_EVENT_UPDATE: u32 = 78;
pub const PERF_RECORD_TIME_CONV: u32 = 79;
pub const PERF_RECORD_HEADER_FEATURE: u32 = 80;
pub const PERF_RECORD_HEADER_MAX: u32 = 81;

// perf_event_attr.sample_type bits.
pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_TIME: u64 = 1 << 2;
pub const PERF_SAMPLE_ADDR: u64 = 1 << 3;
pub const PERF_SAMPLE_READ: u64 = 1 << 4;
pub const PERF_SAMPLE_CALLCHAIN: u64 = 1 << 5;
pub const PERF_SAMPLE_ID: u64 = 1 << 6;
pub const PERF_SAMPLE_CPU: u64 = 1 << 7;
pub const PERF_SAMPLE_PERIOD: u64 = 1 << 8;
pub const PERF_SAMPLE_STREAM_ID: u64 = 1 << 9;
pub const PERF_SAMPLE_RAW: u64 = 1 << 10;
pub const PERF_SAMPLE_BRANCH_STACK: u64 = 1 << 11;
pub const PERF_SAMPLE_REGS_USER: u64 = 1 << 12;
pub const PERF_SAMPLE_STACK_USER: u64 = 1 << 13;
pub const PERF_SAMPLE_WEIGHT: u64 = 1 << 14;
pub const PERF_SAMPLE_DATA_SRC: u64 = 1 << 15;
pub const PERF_SAMPLE_IDENTIFIER: u64 = 1 << 16;
pub const PERF_SAMPLE_TRANSACTION: u64 = 1 << 17;
pub const PERF_SAMPLE_REGS_INTR: u64 = 1 << 18;
pub const PERF_SAMPLE_PHYS_ADDR: u64 = 1 << 19;
pub const PERF_SAMPLE_AUX: u64 = 1 << 20;
pub const PERF_SAMPLE_CGROUP: u64 = 1 << 21;
pub const PERF_SAMPLE_DATA_PAGE_SIZE: u64 = 1 << 22;
pub const PERF_SAMPLE_CODE_PAGE_SIZE: u64 = 1 << 23;
pub const PERF_SAMPLE_WEIGHT_STRUCT: u64 = 1 << 24;

// perf_event_attr.branch_sample_type bits.
pub const PERF_SAMPLE_BRANCH_USER: u64 = 1 << 0;
pub const PERF_SAMPLE_BRANCH_KERNEL: u64 = 1 << 1;
pub const PERF_SAMPLE_BRANCH_HV: u64 = 1 << 2;
pub const PERF_SAMPLE_BRANCH_ANY: u64 = 1 << 3;
pub const PERF_SAMPLE_BRANCH_ANY_CALL: u64 = 1 << 4;
pub const PERF_SAMPLE_BRANCH_ANY_RETURN: u64 = 1 << 5;
pub const PERF_SAMPLE_BRANCH_IND_CALL: u64 = 1 << 6;
pub const PERF_SAMPLE_BRANCH_ABORT_TX: u64 = 1 << 7;
pub const PERF_SAMPLE_BRANCH_IN_TX: u64 = 1 << 8;
pub const PERF_SAMPLE_BRANCH_NO_TX: u64 = 1 << 9;
pub const PERF_SAMPLE_BRANCH_COND: u64 = 1 << 10;
pub const PERF_SAMPLE_BRANCH_CALL_STACK: u64 = 1 << 11;
pub const PERF_SAMPLE_BRANCH_IND_JUMP: u64 = 1 << 12;
pub const PERF_SAMPLE_BRANCH_CALL: u64 = 1 << 13;
pub const PERF_SAMPLE_BRANCH_NO_FLAGS: u64 = 1 << 14;
pub const PERF_SAMPLE_BRANCH_NO_CYCLES: u64 = 1 << 15;
pub const PERF_SAMPLE_BRANCH_TYPE_SAVE: u64 = 1 << 16;
pub const PERF_SAMPLE_BRANCH_HW_INDEX: u64 = 1 << 17;

// perf_event_attr.read_format bits.
pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;
pub const PERF_FORMAT_ID: u64 = 1 << 2;
pub const PERF_FORMAT_GROUP: u64 = 1 << 3;

// Bit positions inside the perf_event_attr flags word.
pub const ATTR_FLAG_BIT_DISABLED: u64 = 1 << 0;
pub const ATTR_FLAG_BIT_INHERIT: u64 = 1 << 1;
pub const ATTR_FLAG_BIT_PINNED: u64 = 1 << 2;
pub const ATTR_FLAG_BIT_EXCLUSIVE: u64 = 1 << 3;
pub const ATTR_FLAG_BIT_EXCLUDE_USER: u64 = 1 << 4;
pub const ATTR_FLAG_BIT_EXCLUDE_KERNEL: u64 = 1 << 5;
pub const ATTR_FLAG_BIT_EXCLUDE_HV: u64 = 1 << 6;
pub const ATTR_FLAG_BIT_EXCLUDE_IDLE: u64 = 1 << 7;
pub const ATTR_FLAG_BIT_MMAP: u64 = 1 << 8;
pub const ATTR_FLAG_BIT_COMM: u64 = 1 << 9;
pub const ATTR_FLAG_BIT_FREQ: u64 = 1 << 10;
pub const ATTR_FLAG_BIT_INHERIT_STAT: u64 = 1 << 11;
pub const ATTR_FLAG_BIT_ENABLE_ON_EXEC: u64 = 1 << 12;
pub const ATTR_FLAG_BIT_TASK: u64 = 1 << 13;
pub const ATTR_FLAG_BIT_WATERMARK: u64 = 1 << 14;
pub const ATTR_FLAG_BITMASK_PRECISE_IP: u64 = 0b11 << 15;
pub const ATTR_FLAG_BIT_MMAP_DATA: u64 = 1 << 17;
pub const ATTR_FLAG_BIT_SAMPLE_ID_ALL: u64 = 1 << 18;
pub const ATTR_FLAG_BIT_EXCLUDE_HOST: u64 = 1 << 19;
pub const ATTR_FLAG_BIT_EXCLUDE_GUEST: u64 = 1 << 20;
pub const ATTR_FLAG_BIT_EXCLUDE_CALLCHAIN_KERNEL: u64 = 1 << 21;
pub const ATTR_FLAG_BIT_EXCLUDE_CALLCHAIN_USER: u64 = 1 << 22;
pub const ATTR_FLAG_BIT_MMAP2: u64 = 1 << 23;
pub const ATTR_FLAG_BIT_COMM_EXEC: u64 = 1 << 24;
pub const ATTR_FLAG_BIT_USE_CLOCKID: u64 = 1 << 25;
pub const ATTR_FLAG_BIT_CONTEXT_SWITCH: u64 = 1 << 26;
pub const ATTR_FLAG_BIT_WRITE_BACKWARD: u64 = 1 << 27;
pub const ATTR_FLAG_BIT_NAMESPACES: u64 = 1 << 28;
pub const ATTR_FLAG_BIT_KSYMBOL: u64 = 1 << 29;
pub const ATTR_FLAG_BIT_BPF_EVENT: u64 = 1 << 30;
pub const ATTR_FLAG_BIT_AUX_OUTPUT: u64 = 1 << 31;
pub const ATTR_FLAG_BIT_CGROUP: u64 = 1 << 32;
pub const ATTR_FLAG_BIT_TEXT_POKE: u64 = 1 << 33;
pub const ATTR_FLAG_BIT_BUILD_ID: u64 = 1 << 34;
pub const ATTR_FLAG_BIT_INHERIT_THREAD: u64 = 1 << 35;
pub const ATTR_FLAG_BIT_REMOVE_ON_EXEC: u64 = 1 << 36;
pub const ATTR_FLAG_BIT_SIGTRAP: u64 = 1 << 37;

// Sizes of perf_event_attr at each published revision.
pub const PERF_ATTR_SIZE_VER0: u32 = 64;
pub const PERF_ATTR_SIZE_VER1: u32 = 72;
pub const PERF_ATTR_SIZE_VER2: u32 = 80;
pub const PERF_ATTR_SIZE_VER3: u32 = 96;
pub const PERF_ATTR_SIZE_VER4: u32 = 104;
pub const PERF_ATTR_SIZE_VER5: u32 = 112;
pub const PERF_ATTR_SIZE_VER6: u32 = 120;
pub const PERF_ATTR_SIZE_VER7: u32 = 128;

// perf_event_header.misc bits.
pub const PERF_RECORD_MISC_CPUMODE_MASK: u16 = 7;
pub const PERF_RECORD_MISC_CPUMODE_UNKNOWN: u16 = 0;
pub const PERF_RECORD_MISC_KERNEL: u16 = 1;
pub const PERF_RECORD_MISC_USER: u16 = 2;
pub const PERF_RECORD_MISC_HYPERVISOR: u16 = 3;
pub const PERF_RECORD_MISC_GUEST_KERNEL: u16 = 4;
pub const PERF_RECORD_MISC_GUEST_USER: u16 = 5;
pub const PERF_RECORD_MISC_PROC_MAP_PARSE_TIMEOUT: u16 = 1 << 12;
pub const PERF_RECORD_MISC_MMAP_DATA: u16 = 1 << 13;
pub const PERF_RECORD_MISC_COMM_EXEC: u16 = 1 << 13;
pub const PERF_RECORD_MISC_SWITCH_OUT: u16 = 1 << 13;
pub const PERF_RECORD_MISC_SWITCH_OUT_PREEMPT: u16 = 1 << 14;
pub const PERF_RECORD_MISC_MMAP_BUILD_ID: u16 = 1 << 14;
/// On a build-id record, marks that the actual build-id length is recorded.
pub const PERF_RECORD_MISC_BUILD_ID_SIZE: u16 = 1 << 15;

// PERF_RECORD_AUX flags.
pub const PERF_AUX_FLAG_TRUNCATED: u64 = 1 << 0;
pub const PERF_AUX_FLAG_OVERWRITE: u64 = 1 << 1;
pub const PERF_AUX_FLAG_PARTIAL: u64 = 1 << 2;

// Feature ids of the metadata trailer sections (tools/perf/util/header.h).
pub const HEADER_RESERVED: u32 = 0;
pub const HEADER_FIRST_FEATURE: u32 = 1;
pub const HEADER_TRACING_DATA: u32 = 1;
pub const HEADER_BUILD_ID: u32 = 2;
pub const HEADER_HOSTNAME: u32 = 3;
pub const HEADER_OSRELEASE: u32 = 4;
pub const HEADER_VERSION: u32 = 5;
pub const HEADER_ARCH: u32 = 6;
pub const HEADER_NRCPUS: u32 = 7;
pub const HEADER_CPUDESC: u32 = 8;
pub const HEADER_CPUID: u32 = 9;
pub const HEADER_TOTAL_MEM: u32 = 10;
pub const HEADER_CMDLINE: u32 = 11;
pub const HEADER_EVENT_DESC: u32 = 12;
pub const HEADER_CPU_TOPOLOGY: u32 = 13;
pub const HEADER_NUMA_TOPOLOGY: u32 = 14;
pub const HEADER_BRANCH_STACK: u32 = 15;
pub const HEADER_PMU_MAPPINGS: u32 = 16;
pub const HEADER_GROUP_DESC: u32 = 17;
pub const HEADER_LAST_FEATURE: u32 = 18;

/// The metadata kinds this crate can parse and re-emit.
pub const SUPPORTED_METADATA_MASK: u64 = 1 << HEADER_TRACING_DATA
    | 1 << HEADER_BUILD_ID
    | 1 << HEADER_HOSTNAME
    | 1 << HEADER_OSRELEASE
    | 1 << HEADER_VERSION
    | 1 << HEADER_ARCH
    | 1 << HEADER_NRCPUS
    | 1 << HEADER_CPUDESC
    | 1 << HEADER_CPUID
    | 1 << HEADER_TOTAL_MEM
    | 1 << HEADER_CMDLINE
    | 1 << HEADER_EVENT_DESC
    | 1 << HEADER_CPU_TOPOLOGY
    | 1 << HEADER_NUMA_TOPOLOGY
    | 1 << HEADER_BRANCH_STACK
    | 1 << HEADER_PMU_MAPPINGS
    | 1 << HEADER_GROUP_DESC;

/// Maximum length of a build id, in bytes.
pub const BUILD_ID_SIZE: usize = 20;

/// Comm strings inside THREAD_MAP entries are capped at 16 bytes.
pub const THREAD_COMM_LEN: usize = 16;

pub const PERF_EVENT_HEADER_SIZE: usize = 8;
pub const PERF_FILE_SECTION_SIZE: usize = 16;
/// Size of the normal-mode file header: magic, size, attr_size, three
/// sections, and the 256-bit feature bitmap.
pub const PERF_FILE_HEADER_SIZE: u64 = 8 * 3 + 16 * 3 + 32;
/// Size of the piped-mode header: magic and size only.
pub const PERF_PIPED_HEADER_SIZE: u64 = 16;

/// Returns a printable name for a record type, for diagnostics.
pub fn event_name(record_type: u32) -> &'static str {
    match record_type {
        PERF_RECORD_MMAP => "MMAP",
        PERF_RECORD_LOST => "LOST",
        PERF_RECORD_COMM => "COMM",
        PERF_RECORD_EXIT => "EXIT",
        PERF_RECORD_THROTTLE => "THROTTLE",
        PERF_RECORD_UNTHROTTLE => "UNTHROTTLE",
        PERF_RECORD_FORK => "FORK",
        PERF_RECORD_READ => "READ",
        PERF_RECORD_SAMPLE => "SAMPLE",
        PERF_RECORD_MMAP2 => "MMAP2",
        PERF_RECORD_AUX => "AUX",
        PERF_RECORD_ITRACE_START => "ITRACE_START",
        PERF_RECORD_LOST_SAMPLES => "LOST_SAMPLES",
        PERF_RECORD_SWITCH => "SWITCH",
        PERF_RECORD_SWITCH_CPU_WIDE => "SWITCH_CPU_WIDE",
        PERF_RECORD_NAMESPACES => "NAMESPACES",
        PERF_RECORD_KSYMBOL => "KSYMBOL",
        PERF_RECORD_BPF_EVENT => "BPF_EVENT",
        PERF_RECORD_CGROUP => "CGROUP",
        PERF_RECORD_TEXT_POKE => "TEXT_POKE",
        PERF_RECORD_HEADER_ATTR => "HEADER_ATTR",
        PERF_RECORD_HEADER_EVENT_TYPE => "HEADER_EVENT_TYPE",
        PERF_RECORD_HEADER_TRACING_DATA => "HEADER_TRACING_DATA",
        PERF_RECORD_HEADER_BUILD_ID => "HEADER_BUILD_ID",
        PERF_RECORD_FINISHED_ROUND => "FINISHED_ROUND",
        PERF_RECORD_ID_INDEX => "ID_INDEX",
        PERF_RECORD_AUXTRACE_INFO => "AUXTRACE_INFO",
        PERF_RECORD_AUXTRACE => "AUXTRACE",
        PERF_RECORD_AUXTRACE_ERROR => "AUXTRACE_ERROR",
        PERF_RECORD_THREAD_MAP => "THREAD_MAP",
        PERF_RECORD_CPU_MAP => "CPU_MAP",
        PERF_RECORD_STAT_CONFIG => "STAT_CONFIG",
        PERF_RECORD_STAT => "STAT",
        PERF_RECORD_STAT_ROUND => "STAT_ROUND",
        PERF_RECORD_EVENT_UPDATE => "EVENT_UPDATE",
        PERF_RECORD_TIME_CONV => "TIME_CONV",
        PERF_RECORD_HEADER_FEATURE => "HEADER_FEATURE",
        _ => "UNKNOWN",
    }
}

/// Returns a printable name for a metadata feature id, for diagnostics.
pub fn metadata_name(feature: u32) -> &'static str {
    match feature {
        HEADER_TRACING_DATA => "TRACING_DATA",
        HEADER_BUILD_ID => "BUILD_ID",
        HEADER_HOSTNAME => "HOSTNAME",
        HEADER_OSRELEASE => "OSRELEASE",
        HEADER_VERSION => "VERSION",
        HEADER_ARCH => "ARCH",
        HEADER_NRCPUS => "NRCPUS",
        HEADER_CPUDESC => "CPUDESC",
        HEADER_CPUID => "CPUID",
        HEADER_TOTAL_MEM => "TOTAL_MEM",
        HEADER_CMDLINE => "CMDLINE",
        HEADER_EVENT_DESC => "EVENT_DESC",
        HEADER_CPU_TOPOLOGY => "CPU_TOPOLOGY",
        HEADER_NUMA_TOPOLOGY => "NUMA_TOPOLOGY",
        HEADER_BRANCH_STACK => "BRANCH_STACK",
        HEADER_PMU_MAPPINGS => "PMU_MAPPINGS",
        HEADER_GROUP_DESC => "GROUP_DESC",
        _ => "UNKNOWN",
    }
}
